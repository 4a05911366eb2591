//! Engulfing candle reversal.
//!
//! Bullish: a bearish bar followed by a bullish bar whose body covers it.
//! Bearish is the mirror. Confidence is the body ratio, halved and capped at 1.

use crate::domain::indicator::Column;
use crate::domain::signal::{BarContext, Direction, Signal, SignalRule};

#[derive(Debug, Clone, PartialEq)]
pub struct Engulfing {
    /// Minimum volume ratio on the engulfing bar; 0 disables the filter.
    pub min_volume_ratio: f64,
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
}

impl Default for Engulfing {
    fn default() -> Self {
        Engulfing {
            min_volume_ratio: 0.0,
            stop_atr_mult: 1.5,
            target_atr_mult: 3.0,
        }
    }
}

impl SignalRule for Engulfing {
    fn name(&self) -> &str {
        "engulfing"
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        let current = ctx.candle();
        let previous = ctx.previous(1)?;
        let atr = ctx.value(Column::Atr);
        if atr.is_nan() {
            return None;
        }
        if self.min_volume_ratio > 0.0 {
            let volume_ratio = ctx.value(Column::VolumeRatio);
            if volume_ratio.is_nan() || volume_ratio < self.min_volume_ratio {
                return None;
            }
        }

        let direction = if previous.is_bearish()
            && current.is_bullish()
            && current.open <= previous.close
            && current.close >= previous.open
        {
            Direction::Long
        } else if previous.is_bullish()
            && current.is_bearish()
            && current.open >= previous.close
            && current.close <= previous.open
        {
            Direction::Short
        } else {
            return None;
        };

        let ratio = current.body().abs() / previous.body().abs();

        Some(Signal {
            direction,
            suggested_stop_distance: atr * self.stop_atr_mult,
            suggested_target_distance: atr * self.target_atr_mult,
            confidence: (ratio / 2.0).min(1.0),
            rule: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;
    use crate::domain::signal::test_support::{blank_frame, candles_from_closes};

    fn pair(first: (f64, f64), second: (f64, f64)) -> Vec<Candle> {
        let mut candles = candles_from_closes(&[first.1, second.1]);
        for (candle, (open, close)) in candles.iter_mut().zip([first, second]) {
            candle.open = open;
            candle.close = close;
            candle.high = open.max(close) + 0.5;
            candle.low = open.min(close) - 0.5;
        }
        candles
    }

    fn frame() -> crate::domain::indicator::IndicatorFrame {
        let mut frame = blank_frame(2);
        frame.atr[1] = 1.0;
        frame.volume_ratio[1] = 1.0;
        frame
    }

    #[test]
    fn bullish_engulfing_goes_long() {
        let candles = pair((101.0, 100.0), (99.5, 102.0));
        let frame = frame();
        let signal = Engulfing::default()
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        // body 2.5 over 1.0
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn bearish_engulfing_goes_short() {
        let candles = pair((100.0, 102.0), (102.5, 99.5));
        let frame = frame();
        let signal = Engulfing::default()
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!((signal.confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn inside_bar_is_not_engulfing() {
        let candles = pair((102.0, 100.0), (100.5, 101.5));
        let frame = frame();
        assert!(Engulfing::default()
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .is_none());
    }

    #[test]
    fn volume_filter_applies() {
        let candles = pair((101.0, 100.0), (99.5, 102.0));
        let frame = frame();
        let rule = Engulfing {
            min_volume_ratio: 1.5,
            ..Engulfing::default()
        };
        assert!(rule
            .evaluate(&BarContext::new(&candles, &frame, 1))
            .is_none());
    }
}
