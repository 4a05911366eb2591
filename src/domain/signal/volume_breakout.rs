//! Volume breakout: a large-bodied candle on heavy volume, traded in the
//! direction of the body.

use crate::domain::indicator::Column;
use crate::domain::signal::{BarContext, Direction, Signal, SignalRule};

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeBreakout {
    pub volume_mult: f64,
    /// Minimum |close - open| as a percentage of the open.
    pub min_body_pct: f64,
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
}

impl Default for VolumeBreakout {
    fn default() -> Self {
        VolumeBreakout {
            volume_mult: 2.0,
            min_body_pct: 0.5,
            stop_atr_mult: 1.0,
            target_atr_mult: 2.0,
        }
    }
}

impl SignalRule for VolumeBreakout {
    fn name(&self) -> &str {
        "volume_breakout"
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        let candle = ctx.candle();
        let volume_ratio = ctx.value(Column::VolumeRatio);
        let atr = ctx.value(Column::Atr);
        if volume_ratio.is_nan() || atr.is_nan() || candle.open <= 0.0 {
            return None;
        }
        if volume_ratio < self.volume_mult {
            return None;
        }

        let body_pct = candle.body().abs() / candle.open * 100.0;
        if body_pct < self.min_body_pct {
            return None;
        }

        let direction = if candle.is_bullish() {
            Direction::Long
        } else if candle.is_bearish() {
            Direction::Short
        } else {
            return None;
        };

        Some(Signal {
            direction,
            suggested_stop_distance: atr * self.stop_atr_mult,
            suggested_target_distance: atr * self.target_atr_mult,
            confidence: (volume_ratio / (2.0 * self.volume_mult)).min(1.0),
            rule: self.name().to_string(),
        })
    }
}
