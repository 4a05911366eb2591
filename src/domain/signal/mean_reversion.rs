//! Bollinger/RSI/volume mean reversion.
//!
//! Long when the close pierces the lower band while RSI is oversold and
//! volume is elevated; short is the mirror against the upper band.
//! Confidence grows with how far the close sits outside the band, measured
//! in band half-widths and capped at 1.

use crate::domain::indicator::Column;
use crate::domain::signal::{resolve, BarContext, Direction, Signal, SignalRule};

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversion {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volume_mult: f64,
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
}

impl Default for MeanReversion {
    fn default() -> Self {
        MeanReversion {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            volume_mult: 1.5,
            stop_atr_mult: 1.5,
            target_atr_mult: 3.0,
        }
    }
}

impl MeanReversion {
    fn signal(&self, direction: Direction, atr: f64, confidence: f64) -> Signal {
        Signal {
            direction,
            suggested_stop_distance: atr * self.stop_atr_mult,
            suggested_target_distance: atr * self.target_atr_mult,
            confidence,
            rule: self.name().to_string(),
        }
    }
}

fn depth(outside: f64, half_width: f64) -> f64 {
    if half_width > 0.0 {
        (0.5 + 0.5 * outside / half_width).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

impl SignalRule for MeanReversion {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        let close = ctx.candle().close;
        let rsi = ctx.value(Column::Rsi);
        let volume_ratio = ctx.value(Column::VolumeRatio);
        let upper = ctx.value(Column::BbUpper);
        let middle = ctx.value(Column::BbMiddle);
        let lower = ctx.value(Column::BbLower);
        let atr = ctx.value(Column::Atr);

        if [rsi, volume_ratio, upper, middle, lower, atr]
            .iter()
            .any(|v| v.is_nan())
        {
            return None;
        }
        if volume_ratio <= self.volume_mult {
            return None;
        }

        let long = (close < lower && rsi < self.rsi_oversold)
            .then(|| self.signal(Direction::Long, atr, depth(lower - close, middle - lower)));
        let short = (close > upper && rsi > self.rsi_overbought)
            .then(|| self.signal(Direction::Short, atr, depth(close - upper, upper - middle)));

        resolve(long.into_iter().chain(short))
    }
}
