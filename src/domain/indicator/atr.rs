//! Average True Range.
//!
//! ATR(n)[i] = mean(TR[i-n+1..=i]), a rolling mean of the true range.
//! TR[0] = high - low (no previous close); afterwards
//! TR[i] = max(high - low, |high - prev_close|, |low - prev_close|).
//! Warmup: first (n-1) values are NaN.

use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;
use crate::domain::indicator::sma::sma;

pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            if i == 0 {
                candle.high - candle.low
            } else {
                candle.true_range(candles[i - 1].close)
            }
        })
        .collect()
}

pub fn atr(candles: &[Candle], period: usize) -> Result<Vec<f64>, BarsimError> {
    sma(&true_ranges(candles), period)
}
