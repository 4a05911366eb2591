//! Technical indicator implementations.
//!
//! Every indicator is a pure function from an ordered input series to an
//! output series of the same length. Bars inside the warm-up window hold
//! `f64::NAN`; every later value is finite for finite input.
//!
//! - [`IndicatorParams`]: periods for the columns of an [`IndicatorFrame`]
//! - [`Column`]: identity of a frame column
//! - [`IndicatorFrame`]: all columns aligned to a candle sequence

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod volume_ratio;

use std::fmt;

use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;

pub use atr::atr;
pub use bollinger::{bollinger, BollingerBands};
pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;
pub use volume_ratio::volume_ratio;

/// Fails with `InsufficientData` when `len < minimum`, and rejects a zero period.
pub(crate) fn check_input(len: usize, period: usize, minimum: usize) -> Result<(), BarsimError> {
    if period == 0 {
        return Err(BarsimError::invalid(
            "indicators",
            "period",
            "period must be at least 1",
        ));
    }
    if len == 0 || len < minimum {
        return Err(BarsimError::InsufficientData {
            bars: len,
            minimum: minimum.max(1),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub volume_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            rsi_period: 14,
            atr_period: 14,
            bb_period: 20,
            bb_std: 2.0,
            volume_period: 20,
            ema_fast: 9,
            ema_slow: 21,
        }
    }
}

impl IndicatorParams {
    /// Number of bars needed before every column holds a value.
    pub fn warmup(&self) -> usize {
        [
            self.rsi_period + 1,
            self.atr_period,
            self.bb_period,
            self.volume_period,
            self.ema_fast,
            self.ema_slow,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Rsi,
    Atr,
    BbUpper,
    BbMiddle,
    BbLower,
    VolumeRatio,
    EmaFast,
    EmaSlow,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Rsi,
        Column::Atr,
        Column::BbUpper,
        Column::BbMiddle,
        Column::BbLower,
        Column::VolumeRatio,
        Column::EmaFast,
        Column::EmaSlow,
    ];
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Column::Rsi => "rsi",
            Column::Atr => "atr",
            Column::BbUpper => "bb_upper",
            Column::BbMiddle => "bb_middle",
            Column::BbLower => "bb_lower",
            Column::VolumeRatio => "volume_ratio",
            Column::EmaFast => "ema_fast",
            Column::EmaSlow => "ema_slow",
        };
        f.write_str(name)
    }
}

/// Indicator columns aligned one-to-one with a candle sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub params: IndicatorParams,
    pub rsi: Vec<f64>,
    pub atr: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
    pub volume_ratio: Vec<f64>,
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
}

impl IndicatorFrame {
    pub fn compute(candles: &[Candle], params: &IndicatorParams) -> Result<Self, BarsimError> {
        let minimum = params.warmup();
        if candles.len() < minimum {
            return Err(BarsimError::InsufficientData {
                bars: candles.len(),
                minimum,
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let bands = bollinger(&closes, params.bb_period, params.bb_std)?;

        Ok(IndicatorFrame {
            params: params.clone(),
            rsi: rsi(&closes, params.rsi_period)?,
            atr: atr(candles, params.atr_period)?,
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            volume_ratio: volume_ratio(&volumes, params.volume_period)?,
            ema_fast: ema(&closes, params.ema_fast)?,
            ema_slow: ema(&closes, params.ema_slow)?,
        })
    }

    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    pub fn column(&self, column: Column) -> &[f64] {
        match column {
            Column::Rsi => &self.rsi,
            Column::Atr => &self.atr,
            Column::BbUpper => &self.bb_upper,
            Column::BbMiddle => &self.bb_middle,
            Column::BbLower => &self.bb_lower,
            Column::VolumeRatio => &self.volume_ratio,
            Column::EmaFast => &self.ema_fast,
            Column::EmaSlow => &self.ema_slow,
        }
    }

    /// Value of `column` at bar `index`, NaN when out of range.
    pub fn get(&self, column: Column, index: usize) -> f64 {
        self.column(column).get(index).copied().unwrap_or(f64::NAN)
    }

    /// True when no column is undefined at `index`.
    pub fn is_warm(&self, index: usize) -> bool {
        Column::ALL
            .iter()
            .all(|&column| !self.get(column, index).is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_candles(count: usize) -> Vec<Candle> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                Candle {
                    timestamp: start + Duration::minutes(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + (i % 7) as f64 * 100.0,
                }
            })
            .collect()
    }

    #[test]
    fn default_warmup_is_longest_period() {
        assert_eq!(IndicatorParams::default().warmup(), 21);
    }

    #[test]
    fn frame_columns_align_with_candles() {
        let candles = make_candles(60);
        let frame = IndicatorFrame::compute(&candles, &IndicatorParams::default()).unwrap();
        for column in Column::ALL {
            assert_eq!(frame.column(column).len(), 60, "{column} length");
        }
        assert_eq!(frame.len(), 60);
    }

    #[test]
    fn frame_is_warm_after_longest_warmup() {
        let candles = make_candles(60);
        let frame = IndicatorFrame::compute(&candles, &IndicatorParams::default()).unwrap();
        // ema_slow(21) is the last column to become valid, at index 20
        assert!(!frame.is_warm(19));
        assert!(frame.is_warm(20));
        assert!((20..60).all(|i| frame.is_warm(i)));
    }

    #[test]
    fn frame_rejects_short_input() {
        let candles = make_candles(10);
        let err = IndicatorFrame::compute(&candles, &IndicatorParams::default()).unwrap_err();
        assert!(matches!(
            err,
            BarsimError::InsufficientData {
                bars: 10,
                minimum: 21
            }
        ));
    }

    #[test]
    fn get_out_of_range_is_nan() {
        let candles = make_candles(30);
        let frame = IndicatorFrame::compute(&candles, &IndicatorParams::default()).unwrap();
        assert!(frame.get(Column::Rsi, 100).is_nan());
    }

    #[test]
    fn column_display() {
        assert_eq!(Column::BbLower.to_string(), "bb_lower");
        assert_eq!(Column::VolumeRatio.to_string(), "volume_ratio");
    }

    #[test]
    fn check_input_zero_period() {
        assert!(matches!(
            check_input(10, 0, 0),
            Err(BarsimError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn check_input_empty() {
        assert!(matches!(
            check_input(0, 3, 3),
            Err(BarsimError::InsufficientData { bars: 0, .. })
        ));
    }
}
