//! Strategy composition: which rules fire, and how positions are entered,
//! sized, scaled and exited.

use crate::domain::indicator::IndicatorParams;
use crate::domain::policy::{EntryMode, ExitPolicy, PositionSizing, ScalePolicy};
use crate::domain::signal::RuleSet;

#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub rules: RuleSet,
    pub indicators: IndicatorParams,
    pub entry: EntryMode,
    pub sizing: PositionSizing,
    pub exit: ExitPolicy,
    pub scaling: ScalePolicy,
}

impl Strategy {
    pub fn new(name: impl Into<String>, rules: RuleSet) -> Self {
        Strategy {
            name: name.into(),
            rules,
            indicators: IndicatorParams::default(),
            entry: EntryMode::Market,
            sizing: PositionSizing::FixedFraction(0.25),
            exit: ExitPolicy::default(),
            scaling: ScalePolicy::default(),
        }
    }

    /// Bars consumed by indicator warm-up before the first possible signal.
    pub fn warmup(&self) -> usize {
        self.indicators.warmup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{EmaCross, MeanReversion};

    fn sample_strategy() -> Strategy {
        Strategy::new(
            "Dip buyer",
            RuleSet::new()
                .with_rule(MeanReversion::default())
                .with_rule(EmaCross::default()),
        )
    }

    #[test]
    fn strategy_defaults() {
        let s = sample_strategy();
        assert_eq!(s.name, "Dip buyer");
        assert_eq!(s.entry, EntryMode::Market);
        assert_eq!(s.sizing, PositionSizing::FixedFraction(0.25));
        assert_eq!(s.scaling.max_fills, 1);
        assert_eq!(s.warmup(), 21);
    }

    #[test]
    fn rules_keep_registration_order() {
        let s = sample_strategy();
        assert_eq!(s.rules.names(), vec!["mean_reversion", "ema_cross"]);
    }

    #[test]
    fn long_only_strategy() {
        let mut s = sample_strategy();
        s.rules.allow_short = false;
        assert!(s.rules.allow_long);
        assert!(!s.rules.allow_short);
    }
}
