//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = X[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values are NaN.

use crate::domain::error::BarsimError;
use crate::domain::indicator::check_input;

pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>, BarsimError> {
    check_input(values.len(), period, period)?;

    let mut out = Vec::with_capacity(values.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            sum += value;
            out.push(f64::NAN);
        } else if i == period - 1 {
            sum += value;
            ema = sum / period as f64;
            out.push(ema);
        } else {
            ema = value * k + ema * (1.0 - k);
            out.push(ema);
        }
    }

    Ok(out)
}
