//! Fast/slow EMA crossover.

use crate::domain::indicator::Column;
use crate::domain::signal::{BarContext, Direction, Signal, SignalRule};

#[derive(Debug, Clone, PartialEq)]
pub struct EmaCross {
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
    pub confidence: f64,
}

impl Default for EmaCross {
    fn default() -> Self {
        EmaCross {
            stop_atr_mult: 2.0,
            target_atr_mult: 4.0,
            confidence: 0.5,
        }
    }
}

impl SignalRule for EmaCross {
    fn name(&self) -> &str {
        "ema_cross"
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        let fast = ctx.value(Column::EmaFast);
        let slow = ctx.value(Column::EmaSlow);
        let prev_fast = ctx.value_back(Column::EmaFast, 1);
        let prev_slow = ctx.value_back(Column::EmaSlow, 1);
        let atr = ctx.value(Column::Atr);
        if [fast, slow, prev_fast, prev_slow, atr]
            .iter()
            .any(|v| v.is_nan())
        {
            return None;
        }

        let direction = if prev_fast <= prev_slow && fast > slow {
            Direction::Long
        } else if prev_fast >= prev_slow && fast < slow {
            Direction::Short
        } else {
            return None;
        };

        Some(Signal {
            direction,
            suggested_stop_distance: atr * self.stop_atr_mult,
            suggested_target_distance: atr * self.target_atr_mult,
            confidence: self.confidence,
            rule: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_support::{blank_frame, candles_from_closes};

    fn frame(prev: (f64, f64), now: (f64, f64)) -> crate::domain::indicator::IndicatorFrame {
        let mut frame = blank_frame(2);
        frame.ema_fast = vec![prev.0, now.0];
        frame.ema_slow = vec![prev.1, now.1];
        frame.atr[1] = 1.5;
        frame
    }

    fn eval(frame: &crate::domain::indicator::IndicatorFrame) -> Option<Signal> {
        let candles = candles_from_closes(&[100.0, 101.0]);
        EmaCross::default().evaluate(&BarContext::new(&candles, frame, 1))
    }

    #[test]
    fn golden_cross_goes_long() {
        let signal = eval(&frame((99.0, 100.0), (101.0, 100.0))).unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!((signal.suggested_stop_distance - 3.0).abs() < 1e-12);
    }

    #[test]
    fn death_cross_goes_short() {
        let signal = eval(&frame((101.0, 100.0), (99.0, 100.0))).unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn no_cross_no_signal() {
        assert!(eval(&frame((101.0, 100.0), (102.0, 100.0))).is_none());
    }

    #[test]
    fn first_bar_has_no_previous_value() {
        let candles = candles_from_closes(&[100.0]);
        let mut frame = blank_frame(1);
        frame.ema_fast[0] = 101.0;
        frame.ema_slow[0] = 100.0;
        frame.atr[0] = 1.0;
        assert!(EmaCross::default()
            .evaluate(&BarContext::new(&candles, &frame, 0))
            .is_none());
    }
}
