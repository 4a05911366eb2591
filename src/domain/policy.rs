//! Entry, exit, scaling and sizing policies.
//!
//! Policies are plain values built once from configuration. Distances are
//! written in a compact form so they fit on one INI line:
//!
//! | form        | meaning                                        |
//! |-------------|------------------------------------------------|
//! | `pct:1.5`   | 1.5 % of the reference price                   |
//! | `atr:2.0`   | 2 × ATR at the signal bar                      |
//! | `signal`    | the distance suggested by the firing rule      |

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Percent(f64),
    Atr(f64),
    Signal,
}

impl Distance {
    /// Absolute price distance for the given reference price.
    pub fn resolve(&self, reference_price: f64, atr: f64, signal_distance: f64) -> f64 {
        match *self {
            Distance::Percent(pct) => reference_price * pct / 100.0,
            Distance::Atr(mult) => atr * mult,
            Distance::Signal => signal_distance,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Percent(pct) => write!(f, "pct:{pct}"),
            Distance::Atr(mult) => write!(f, "atr:{mult}"),
            Distance::Signal => f.write_str("signal"),
        }
    }
}

fn parse_positive(raw: &str, what: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid {what} '{}'", raw.trim()))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{what} must be positive, got {value}"));
    }
    Ok(value)
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("signal") {
            return Ok(Distance::Signal);
        }
        match s.split_once(':') {
            Some((kind, value)) => match kind.trim().to_lowercase().as_str() {
                "pct" => Ok(Distance::Percent(parse_positive(value, "percentage")?)),
                "atr" => Ok(Distance::Atr(parse_positive(value, "ATR multiple")?)),
                other => Err(format!("unknown distance kind '{other}'")),
            },
            None => Err(format!(
                "invalid distance '{s}', expected pct:<n>, atr:<n> or signal"
            )),
        }
    }
}

/// Parses a comma-separated list of distances, e.g. `pct:1, pct:2, atr:1.5`.
pub fn parse_distance_list(s: &str) -> Result<Vec<Distance>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// One take-profit level: distance from the average entry and the share of
/// the total filled size to close there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSpec {
    pub distance: Distance,
    pub fraction: f64,
}

impl FromStr for TargetSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (distance, fraction) = match s.split_once('@') {
            Some((distance, fraction)) => (distance, parse_positive(fraction, "target fraction")?),
            None => (s, 1.0),
        };
        if fraction > 1.0 {
            return Err(format!("target fraction must be at most 1, got {fraction}"));
        }
        Ok(TargetSpec {
            distance: distance.parse()?,
            fraction,
        })
    }
}

/// Parses `atr:1.5@0.5, atr:3@0.5`. An empty string means no targets.
pub fn parse_targets(s: &str) -> Result<Vec<TargetSpec>, String> {
    let targets: Vec<TargetSpec> = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()?;
    let total: f64 = targets.iter().map(|t| t.fraction).sum();
    if total > 1.0 + 1e-9 {
        return Err(format!("target fractions sum to {total}, must be at most 1"));
    }
    Ok(targets)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    pub stop: Distance,
    pub targets: Vec<TargetSpec>,
    pub max_hold_bars: Option<usize>,
    pub exit_on_opposite_signal: bool,
    pub trailing: Option<Distance>,
    /// Move the stop to the average entry after this many partial exits.
    pub breakeven_after_partials: Option<usize>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy {
            stop: Distance::Signal,
            targets: vec![TargetSpec {
                distance: Distance::Signal,
                fraction: 1.0,
            }],
            max_hold_bars: None,
            exit_on_opposite_signal: false,
            trailing: None,
            breakeven_after_partials: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAnchor {
    /// Stop sits a stop distance beyond the most recent fill.
    Latest,
    /// Stop sits a stop distance beyond the average entry.
    Average,
}

impl FromStr for StopAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" => Ok(StopAnchor::Latest),
            "average" => Ok(StopAnchor::Average),
            other => Err(format!("unknown stop anchor '{other}', expected latest or average")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalePolicy {
    /// Total fills allowed, including the opening one. 1 disables scaling.
    pub max_fills: usize,
    /// Adverse distance from the latest fill to the next scale-in level.
    pub step: Distance,
    /// Size multiplier per fill; missing entries default to 1.
    pub allocations: Vec<f64>,
    pub stop_anchor: StopAnchor,
    /// Collapse pending targets to the average entry once this many fills exist.
    pub breakeven_target_after_fills: Option<usize>,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        ScalePolicy {
            max_fills: 1,
            step: Distance::Percent(5.0),
            allocations: Vec::new(),
            stop_anchor: StopAnchor::Latest,
            breakeven_target_after_fills: None,
        }
    }
}

impl ScalePolicy {
    pub fn enabled(&self) -> bool {
        self.max_fills > 1
    }

    pub fn allocation(&self, fill_index: usize) -> f64 {
        self.allocations.get(fill_index).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryMode {
    /// Fill at the signal bar's close, plus slippage.
    Market,
    /// Rest a limit `offset_pct` better than the signal close for up to
    /// `max_wait_bars` bars.
    Limit { offset_pct: f64, max_wait_bars: usize },
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryMode::Market => f.write_str("market"),
            EntryMode::Limit {
                offset_pct,
                max_wait_bars,
            } => write!(f, "limit:{offset_pct}:{max_wait_bars}"),
        }
    }
}

impl FromStr for EntryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("market") {
            return Ok(EntryMode::Market);
        }
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [kind, offset, wait] if kind.eq_ignore_ascii_case("limit") => {
                let offset_pct: f64 = offset
                    .parse()
                    .map_err(|_| format!("invalid limit offset '{offset}'"))?;
                if !offset_pct.is_finite() || offset_pct < 0.0 {
                    return Err(format!("limit offset must be non-negative, got {offset_pct}"));
                }
                let max_wait_bars: usize = wait
                    .parse()
                    .map_err(|_| format!("invalid limit wait '{wait}'"))?;
                if max_wait_bars == 0 {
                    return Err("limit wait must be at least 1 bar".to_string());
                }
                Ok(EntryMode::Limit {
                    offset_pct,
                    max_wait_bars,
                })
            }
            _ => Err(format!(
                "invalid entry mode '{s}', expected market or limit:<offset_pct>:<bars>"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSizing {
    /// Notional = capital × fraction × leverage.
    FixedFraction(f64),
    /// Size such that hitting the stop loses `base_risk_pct` of capital.
    /// Cumulative risk across fills may not exceed `max_risk_pct`.
    RiskPercent { base_risk_pct: f64, max_risk_pct: f64 },
    /// Fixed base-asset quantity.
    FixedQuantity(f64),
}

impl PositionSizing {
    /// Base-asset size for a fill, capped so notional never exceeds
    /// `capital × leverage`. Returns 0 when no sensible size exists.
    pub fn size(
        &self,
        capital: f64,
        price: f64,
        stop_distance: f64,
        allocation: f64,
        leverage: f64,
    ) -> f64 {
        if capital <= 0.0 || price <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        let raw = match *self {
            PositionSizing::FixedFraction(fraction) => {
                capital * fraction * allocation * leverage / price
            }
            PositionSizing::RiskPercent { base_risk_pct, .. } => {
                if stop_distance <= 0.0 || !stop_distance.is_finite() {
                    return 0.0;
                }
                capital * base_risk_pct / 100.0 * allocation / stop_distance
            }
            PositionSizing::FixedQuantity(quantity) => quantity * allocation,
        };
        let cap = capital * leverage / price;
        raw.min(cap).max(0.0)
    }

    /// Risk (percent of capital) a fill with `allocation` adds.
    pub fn fill_risk_pct(&self, allocation: f64) -> f64 {
        match *self {
            PositionSizing::RiskPercent { base_risk_pct, .. } => base_risk_pct * allocation,
            _ => 0.0,
        }
    }

    /// Whether another fill keeps cumulative risk within the configured maximum.
    pub fn allows_additional_risk(&self, committed_pct: f64, allocation: f64) -> bool {
        match *self {
            PositionSizing::RiskPercent { max_risk_pct, .. } => {
                committed_pct + self.fill_risk_pct(allocation) <= max_risk_pct + 1e-9
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distances() {
        assert_eq!("pct:1.5".parse::<Distance>().unwrap(), Distance::Percent(1.5));
        assert_eq!(" ATR:2 ".parse::<Distance>().unwrap(), Distance::Atr(2.0));
        assert_eq!("signal".parse::<Distance>().unwrap(), Distance::Signal);
        assert!("pct:-1".parse::<Distance>().is_err());
        assert!("pct:abc".parse::<Distance>().is_err());
        assert!("ticks:3".parse::<Distance>().is_err());
        assert!("1.5".parse::<Distance>().is_err());
    }

    #[test]
    fn distance_display_round_trips() {
        for d in [Distance::Percent(1.5), Distance::Atr(2.0), Distance::Signal] {
            assert_eq!(d.to_string().parse::<Distance>().unwrap(), d);
        }
    }

    #[test]
    fn resolve_distance() {
        assert!((Distance::Percent(5.0).resolve(200.0, 3.0, 7.0) - 10.0).abs() < 1e-12);
        assert!((Distance::Atr(2.0).resolve(200.0, 3.0, 7.0) - 6.0).abs() < 1e-12);
        assert!((Distance::Signal.resolve(200.0, 3.0, 7.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn parse_target_list() {
        let targets = parse_targets("atr:1.5@0.5, atr:3@0.5").unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].distance, Distance::Atr(1.5));
        assert!((targets[1].fraction - 0.5).abs() < 1e-12);

        let single = parse_targets("pct:2").unwrap();
        assert_eq!(single[0].fraction, 1.0);

        assert!(parse_targets("").unwrap().is_empty());
    }

    #[test]
    fn target_fractions_cannot_exceed_one() {
        assert!(parse_targets("pct:1@0.7, pct:2@0.7").is_err());
        assert!(parse_targets("pct:1@1.5").is_err());
    }

    #[test]
    fn parse_entry_mode() {
        assert_eq!("market".parse::<EntryMode>().unwrap(), EntryMode::Market);
        assert_eq!(
            "limit:0.2:5".parse::<EntryMode>().unwrap(),
            EntryMode::Limit {
                offset_pct: 0.2,
                max_wait_bars: 5
            }
        );
        assert!("limit:0.2".parse::<EntryMode>().is_err());
        assert!("limit:0.2:0".parse::<EntryMode>().is_err());
        assert!("stop:1:1".parse::<EntryMode>().is_err());
    }

    #[test]
    fn parse_stop_anchor() {
        assert_eq!("Latest".parse::<StopAnchor>().unwrap(), StopAnchor::Latest);
        assert_eq!("average".parse::<StopAnchor>().unwrap(), StopAnchor::Average);
        assert!("first".parse::<StopAnchor>().is_err());
    }

    #[test]
    fn scale_allocation_defaults_to_one() {
        let policy = ScalePolicy {
            allocations: vec![1.0, 0.5],
            ..ScalePolicy::default()
        };
        assert_eq!(policy.allocation(1), 0.5);
        assert_eq!(policy.allocation(4), 1.0);
        assert!(!policy.enabled());
    }

    #[test]
    fn fixed_fraction_sizing() {
        let size = PositionSizing::FixedFraction(0.5).size(10_000.0, 100.0, 1.0, 1.0, 2.0);
        // 10k * 0.5 * 2x = 10k notional
        assert!((size - 100.0).abs() < 1e-9);
    }

    #[test]
    fn risk_percent_sizing() {
        let sizing = PositionSizing::RiskPercent {
            base_risk_pct: 1.0,
            max_risk_pct: 3.0,
        };
        // risk $100 with a $2 stop → 50 units, $5000 notional
        let size = sizing.size(10_000.0, 100.0, 2.0, 1.0, 1.0);
        assert!((size - 50.0).abs() < 1e-9);
    }

    #[test]
    fn sizing_is_capped_by_leverage() {
        let sizing = PositionSizing::RiskPercent {
            base_risk_pct: 2.0,
            max_risk_pct: 2.0,
        };
        // uncapped would be 200 / 0.1 = 2000 units
        let size = sizing.size(10_000.0, 100.0, 0.1, 1.0, 3.0);
        assert!((size - 300.0).abs() < 1e-9);
    }

    #[test]
    fn risk_sizing_without_stop_is_zero() {
        let sizing = PositionSizing::RiskPercent {
            base_risk_pct: 1.0,
            max_risk_pct: 1.0,
        };
        assert_eq!(sizing.size(10_000.0, 100.0, 0.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn risk_budget() {
        let sizing = PositionSizing::RiskPercent {
            base_risk_pct: 1.0,
            max_risk_pct: 2.5,
        };
        assert!(sizing.allows_additional_risk(1.0, 1.5));
        assert!(!sizing.allows_additional_risk(2.0, 1.0));
        assert!(PositionSizing::FixedQuantity(1.0).allows_additional_risk(100.0, 1.0));
    }
}
