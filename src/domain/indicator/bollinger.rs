//! Bollinger Bands.
//!
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (n_std × StdDev)
//! - Lower: Middle - (n_std × StdDev)
//!
//! StdDev is the rolling sample standard deviation (see [`rolling_stddev`]).
//! Warmup: first (period-1) values are NaN in all three bands.

use crate::domain::error::BarsimError;
use crate::domain::indicator::sma::sma;
use crate::domain::indicator::stddev::rolling_stddev;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(closes: &[f64], period: usize, n_std: f64) -> Result<BollingerBands, BarsimError> {
    let middle = sma(closes, period)?;
    let spread = rolling_stddev(closes, period)?;

    let upper = middle
        .iter()
        .zip(&spread)
        .map(|(m, s)| m + n_std * s)
        .collect();
    let lower = middle
        .iter()
        .zip(&spread)
        .map(|(m, s)| m - n_std * s)
        .collect();

    Ok(BollingerBands {
        upper,
        middle,
        lower,
    })
}
