//! Rolling standard deviation.
//!
//! Sample standard deviation (divides by n-1) over n values, matching the
//! rolling statistics the Bollinger bands are built on.
//! STDDEV(n)[i] = sqrt(sum((X[i-j] - SMA(n)[i])^2 for j in 0..n) / (n-1))
//! Warmup: first (n-1) values are NaN. A window of one value has zero spread.

use crate::domain::error::BarsimError;
use crate::domain::indicator::check_input;

pub fn rolling_stddev(values: &[f64], period: usize) -> Result<Vec<f64>, BarsimError> {
    check_input(values.len(), period, period)?;

    let mut out = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            out.push(f64::NAN);
            continue;
        }
        if period == 1 {
            out.push(0.0);
            continue;
        }

        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (period - 1) as f64;

        out.push(variance.sqrt());
    }

    Ok(out)
}
