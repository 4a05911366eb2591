//! Volume ratio: current volume over its rolling mean.
//!
//! VR(n)[i] = V[i] / SMA(V, n)[i]. The window includes the current bar.
//! A zero mean (no volume traded in the window) yields 0.
//! Warmup: first (n-1) values are NaN.

use crate::domain::error::BarsimError;
use crate::domain::indicator::sma::sma;

pub fn volume_ratio(volumes: &[f64], period: usize) -> Result<Vec<f64>, BarsimError> {
    let means = sma(volumes, period)?;

    Ok(volumes
        .iter()
        .zip(means)
        .map(|(&volume, mean)| {
            if mean.is_nan() {
                f64::NAN
            } else if mean == 0.0 {
                0.0
            } else {
                volume / mean
            }
        })
        .collect())
}
