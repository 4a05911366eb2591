//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(X[i-n+1..=i]). Warmup: first (n-1) values are NaN.

use crate::domain::error::BarsimError;
use crate::domain::indicator::check_input;

pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>, BarsimError> {
    check_input(values.len(), period, period)?;

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        sum += value;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 < period {
            out.push(f64::NAN);
        } else {
            out.push(sum / period as f64);
        }
    }

    Ok(out)
}
