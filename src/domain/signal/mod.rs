//! Entry/exit signal rules.
//!
//! A [`SignalRule`] is a stateless predicate over the bars up to and
//! including the current one. [`BarContext`] only exposes that prefix, so a
//! rule cannot read a future bar or a future indicator value.
//!
//! # Resolution
//!
//! [`RuleSet::evaluate`] asks every rule in registration order. When several
//! rules fire (possibly in opposite directions) the signal with the highest
//! confidence wins; on equal confidence the first registered rule wins.
//! Rules that can see both a long and a short setup on the same bar resolve
//! them with the same [`resolve`] function, long candidate first.

pub mod ema_cross;
pub mod engulfing;
pub mod mean_reversion;
pub mod session;
pub mod volume_breakout;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::candle::Candle;
use crate::domain::indicator::{Column, IndicatorFrame};

pub use ema_cross::EmaCross;
pub use engulfing::Engulfing;
pub use mean_reversion::MeanReversion;
pub use session::SessionFilter;
pub use volume_breakout::VolumeBreakout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub direction: Direction,
    /// Price distance from entry to the suggested stop.
    pub suggested_stop_distance: f64,
    /// Price distance from entry to the suggested target.
    pub suggested_target_distance: f64,
    pub confidence: f64,
    pub rule: String,
}

/// Read-only view of the bars `0..=index` and their indicator values.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    candles: &'a [Candle],
    frame: &'a IndicatorFrame,
    index: usize,
}

impl<'a> BarContext<'a> {
    /// `index` must be a valid position in `candles`.
    pub fn new(candles: &'a [Candle], frame: &'a IndicatorFrame, index: usize) -> Self {
        BarContext {
            candles: &candles[..=index],
            frame,
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn candle(&self) -> &'a Candle {
        &self.candles[self.index]
    }

    /// The candle `back` bars before the current one.
    pub fn previous(&self, back: usize) -> Option<&'a Candle> {
        self.index
            .checked_sub(back)
            .and_then(|i| self.candles.get(i))
    }

    pub fn value(&self, column: Column) -> f64 {
        self.frame.get(column, self.index)
    }

    /// Indicator value `back` bars before the current one, NaN before the series start.
    pub fn value_back(&self, column: Column, back: usize) -> f64 {
        match self.index.checked_sub(back) {
            Some(i) => self.frame.get(column, i),
            None => f64::NAN,
        }
    }
}

pub trait SignalRule: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal>;
}

/// Highest confidence wins; ties keep the earliest candidate. NaN confidence ranks lowest.
pub fn resolve<I>(candidates: I) -> Option<Signal>
where
    I: IntoIterator<Item = Signal>,
{
    let rank = |s: &Signal| {
        if s.confidence.is_nan() {
            f64::NEG_INFINITY
        } else {
            s.confidence
        }
    };

    let mut best: Option<Signal> = None;
    for candidate in candidates {
        match &best {
            Some(current) if rank(&candidate) <= rank(current) => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Arc<dyn SignalRule>>,
    pub allow_long: bool,
    pub allow_short: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet {
            rules: Vec::new(),
            allow_long: true,
            allow_short: true,
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule<R: SignalRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn push(&mut self, rule: Arc<dyn SignalRule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    fn allows(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.allow_long,
            Direction::Short => self.allow_short,
        }
    }

    pub fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        resolve(
            self.rules
                .iter()
                .filter_map(|rule| rule.evaluate(ctx))
                .filter(|signal| self.allows(signal.direction)),
        )
    }
}
