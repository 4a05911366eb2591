//! Configuration loading and validation.
//!
//! Every key is checked before any bar is simulated. The `load_*` functions
//! return the typed objects the engine runs on; the `validate_*` functions
//! run the same checks and discard the result. Missing optional keys take
//! their defaults, present but malformed keys are always an error.

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::domain::backtest::BacktestConfig;
use crate::domain::candle::parse_timestamp;
use crate::domain::cost::CostModel;
use crate::domain::error::BarsimError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::policy::{
    parse_targets, Distance, EntryMode, ExitPolicy, PositionSizing, ScalePolicy, StopAnchor,
};
use crate::domain::signal::{
    EmaCross, Engulfing, MeanReversion, RuleSet, SessionFilter, SignalRule, VolumeBreakout,
};
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;

pub const BACKTEST: &str = "backtest";
pub const INDICATORS: &str = "indicators";
pub const STRATEGY: &str = "strategy";
pub const RISK: &str = "risk";

pub const KNOWN_RULES: [&str; 4] = ["mean_reversion", "volume_breakout", "ema_cross", "engulfing"];

/// Trimmed value, with empty strings treated as absent.
fn read_string(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, BarsimError> {
    match read_string(config, section, key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(BarsimError::invalid(
                section,
                key,
                format!("expected a number, got '{raw}'"),
            )),
        },
    }
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, BarsimError> {
    match read_string(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            BarsimError::invalid(section, key, format!("expected a whole number, got '{raw}'"))
        }),
    }
}

fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, BarsimError> {
    match read_string(config, section, key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(BarsimError::invalid(
                section,
                key,
                format!("expected true or false, got '{raw}'"),
            )),
        },
    }
}

fn read_parsed<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, BarsimError>
where
    T: FromStr<Err = String>,
{
    read_string(config, section, key)
        .map(|raw| raw.parse::<T>().map_err(|reason| BarsimError::invalid(section, key, reason)))
        .transpose()
}

/// Zero means "disabled".
fn read_optional_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<usize>, BarsimError> {
    let value = read_usize(config, section, key, 0)?;
    Ok((value > 0).then_some(value))
}

fn read_optional_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, BarsimError> {
    if read_string(config, section, key).is_none() {
        return Ok(None);
    }
    let value = read_double(config, section, key, 0.0)?;
    require_positive(section, key, value).map(Some)
}

fn read_timestamp(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDateTime>, BarsimError> {
    read_string(config, section, key)
        .map(|raw| {
            parse_timestamp(&raw).ok_or_else(|| {
                BarsimError::invalid(
                    section,
                    key,
                    format!("invalid timestamp '{raw}', expected ISO-8601 or YYYY-MM-DD"),
                )
            })
        })
        .transpose()
}

fn require_positive(section: &str, key: &str, value: f64) -> Result<f64, BarsimError> {
    if value <= 0.0 {
        return Err(BarsimError::invalid(section, key, format!("must be positive, got {value}")));
    }
    Ok(value)
}

fn require_non_negative(section: &str, key: &str, value: f64) -> Result<f64, BarsimError> {
    if value < 0.0 {
        return Err(BarsimError::invalid(
            section,
            key,
            format!("must be non-negative, got {value}"),
        ));
    }
    Ok(value)
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BarsimError> {
    let defaults = BacktestConfig::default();

    let initial_capital = require_positive(
        BACKTEST,
        "initial_capital",
        read_double(config, BACKTEST, "initial_capital", defaults.initial_capital)?,
    )?;
    let fee_pct = require_non_negative(
        BACKTEST,
        "fee_pct",
        read_double(config, BACKTEST, "fee_pct", defaults.costs.fee_pct)?,
    )?;
    let slippage_pct = require_non_negative(
        BACKTEST,
        "slippage_pct",
        read_double(config, BACKTEST, "slippage_pct", defaults.costs.slippage_pct)?,
    )?;
    let leverage = require_positive(
        BACKTEST,
        "leverage",
        read_double(config, BACKTEST, "leverage", defaults.leverage)?,
    )?;
    let min_notional = require_non_negative(
        BACKTEST,
        "min_notional",
        read_double(config, BACKTEST, "min_notional", defaults.min_notional)?,
    )?;
    let periods_per_year = require_positive(
        BACKTEST,
        "periods_per_year",
        read_double(config, BACKTEST, "periods_per_year", defaults.periods_per_year)?,
    )?;

    let start = read_timestamp(config, BACKTEST, "start")?;
    let end = read_timestamp(config, BACKTEST, "end")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(BarsimError::invalid(BACKTEST, "start", "start must be before end"));
        }
    }

    Ok(BacktestConfig {
        symbol: read_string(config, BACKTEST, "symbol").unwrap_or(defaults.symbol),
        start,
        end,
        initial_capital,
        costs: CostModel {
            fee_pct,
            slippage_pct,
        },
        leverage,
        min_notional,
        periods_per_year,
    })
}

pub fn load_indicator_params(config: &dyn ConfigPort) -> Result<IndicatorParams, BarsimError> {
    let defaults = IndicatorParams::default();
    let period = |key: &str, default: usize| -> Result<usize, BarsimError> {
        let value = read_usize(config, INDICATORS, key, default)?;
        if value == 0 {
            return Err(BarsimError::invalid(INDICATORS, key, "period must be at least 1"));
        }
        Ok(value)
    };

    let params = IndicatorParams {
        rsi_period: period("rsi_period", defaults.rsi_period)?,
        atr_period: period("atr_period", defaults.atr_period)?,
        bb_period: period("bb_period", defaults.bb_period)?,
        bb_std: require_positive(
            INDICATORS,
            "bb_std",
            read_double(config, INDICATORS, "bb_std", defaults.bb_std)?,
        )?,
        volume_period: period("volume_period", defaults.volume_period)?,
        ema_fast: period("ema_fast", defaults.ema_fast)?,
        ema_slow: period("ema_slow", defaults.ema_slow)?,
    };
    if params.ema_fast >= params.ema_slow {
        return Err(BarsimError::invalid(
            INDICATORS,
            "ema_fast",
            format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                params.ema_fast, params.ema_slow
            ),
        ));
    }
    Ok(params)
}

/// Parses a session window like `8-20` into UTC hours.
fn parse_session(raw: &str) -> Result<(u32, u32), String> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| format!("invalid session '{raw}', expected <start>-<end> hours"))?;
    let start: u32 = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid session start '{start}'"))?;
    let end: u32 = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid session end '{end}'"))?;
    if start > 23 || end > 24 {
        return Err(format!("session hours out of range in '{raw}'"));
    }
    if start == end {
        return Err(format!("session '{raw}' is empty"));
    }
    Ok((start, end))
}

pub fn load_rules(config: &dyn ConfigPort) -> Result<RuleSet, BarsimError> {
    let names = read_string(config, STRATEGY, "rules")
        .ok_or_else(|| BarsimError::missing(STRATEGY, "rules"))?;

    let oversold = read_double(config, STRATEGY, "rsi_oversold", 30.0)?;
    let overbought = read_double(config, STRATEGY, "rsi_overbought", 70.0)?;
    if !(0.0 < oversold && oversold < overbought && overbought < 100.0) {
        return Err(BarsimError::invalid(
            STRATEGY,
            "rsi_oversold",
            format!("need 0 < rsi_oversold ({oversold}) < rsi_overbought ({overbought}) < 100"),
        ));
    }
    let volume_mult = require_positive(
        STRATEGY,
        "volume_mult",
        read_double(config, STRATEGY, "volume_mult", 1.5)?,
    )?;
    let breakout_volume_mult = require_positive(
        STRATEGY,
        "breakout_volume_mult",
        read_double(config, STRATEGY, "breakout_volume_mult", 2.0)?,
    )?;
    let breakout_body_pct = require_non_negative(
        STRATEGY,
        "breakout_body_pct",
        read_double(config, STRATEGY, "breakout_body_pct", 0.5)?,
    )?;
    let engulfing_min_volume_ratio = require_non_negative(
        STRATEGY,
        "engulfing_min_volume_ratio",
        read_double(config, STRATEGY, "engulfing_min_volume_ratio", 0.0)?,
    )?;
    let stop_atr = read_optional_positive(config, STRATEGY, "signal_stop_atr")?;
    let target_atr = read_optional_positive(config, STRATEGY, "signal_target_atr")?;

    let session = read_string(config, STRATEGY, "session")
        .map(|raw| parse_session(&raw).map_err(|r| BarsimError::invalid(STRATEGY, "session", r)))
        .transpose()?;

    let mut rules = RuleSet::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let rule: Arc<dyn SignalRule> = match name.to_lowercase().as_str() {
            "mean_reversion" => {
                let d = MeanReversion::default();
                Arc::new(MeanReversion {
                    rsi_oversold: oversold,
                    rsi_overbought: overbought,
                    volume_mult,
                    stop_atr_mult: stop_atr.unwrap_or(d.stop_atr_mult),
                    target_atr_mult: target_atr.unwrap_or(d.target_atr_mult),
                })
            }
            "volume_breakout" => {
                let d = VolumeBreakout::default();
                Arc::new(VolumeBreakout {
                    volume_mult: breakout_volume_mult,
                    min_body_pct: breakout_body_pct,
                    stop_atr_mult: stop_atr.unwrap_or(d.stop_atr_mult),
                    target_atr_mult: target_atr.unwrap_or(d.target_atr_mult),
                })
            }
            "ema_cross" => {
                let d = EmaCross::default();
                Arc::new(EmaCross {
                    stop_atr_mult: stop_atr.unwrap_or(d.stop_atr_mult),
                    target_atr_mult: target_atr.unwrap_or(d.target_atr_mult),
                    ..d
                })
            }
            "engulfing" => {
                let d = Engulfing::default();
                Arc::new(Engulfing {
                    min_volume_ratio: engulfing_min_volume_ratio,
                    stop_atr_mult: stop_atr.unwrap_or(d.stop_atr_mult),
                    target_atr_mult: target_atr.unwrap_or(d.target_atr_mult),
                })
            }
            other => {
                return Err(BarsimError::invalid(
                    STRATEGY,
                    "rules",
                    format!("unknown rule '{other}', expected one of {}", KNOWN_RULES.join(", ")),
                ));
            }
        };
        let rule: Arc<dyn SignalRule> = match session {
            Some((start, end)) => Arc::new(SessionFilter::new(rule, start, end)),
            None => rule,
        };
        rules.push(rule);
    }
    if rules.is_empty() {
        return Err(BarsimError::missing(STRATEGY, "rules"));
    }

    rules.allow_long = read_bool(config, STRATEGY, "allow_long", true)?;
    rules.allow_short = read_bool(config, STRATEGY, "allow_short", true)?;
    if !rules.allow_long && !rules.allow_short {
        return Err(BarsimError::invalid(
            STRATEGY,
            "allow_long",
            "at least one of allow_long and allow_short must be true",
        ));
    }
    Ok(rules)
}

pub fn load_sizing(config: &dyn ConfigPort) -> Result<PositionSizing, BarsimError> {
    let name = read_string(config, RISK, "sizing").unwrap_or_else(|| "fixed_fraction".to_string());
    match name.to_lowercase().as_str() {
        "fixed_fraction" => {
            let fraction = read_double(config, RISK, "position_fraction", 0.25)?;
            if fraction <= 0.0 || fraction > 1.0 {
                return Err(BarsimError::invalid(
                    RISK,
                    "position_fraction",
                    format!("must be in (0, 1], got {fraction}"),
                ));
            }
            Ok(PositionSizing::FixedFraction(fraction))
        }
        "risk_percent" => {
            let base_risk_pct = read_double(config, RISK, "base_risk_pct", 1.0)?;
            if base_risk_pct <= 0.0 || base_risk_pct > 100.0 {
                return Err(BarsimError::invalid(
                    RISK,
                    "base_risk_pct",
                    format!("must be in (0, 100], got {base_risk_pct}"),
                ));
            }
            let max_risk_pct = read_double(config, RISK, "max_risk_pct", base_risk_pct)?;
            if max_risk_pct < base_risk_pct {
                return Err(BarsimError::invalid(
                    RISK,
                    "max_risk_pct",
                    format!("max_risk_pct ({max_risk_pct}) must be >= base_risk_pct ({base_risk_pct})"),
                ));
            }
            if max_risk_pct > 100.0 {
                return Err(BarsimError::invalid(
                    RISK,
                    "max_risk_pct",
                    format!("must be at most 100, got {max_risk_pct}"),
                ));
            }
            Ok(PositionSizing::RiskPercent {
                base_risk_pct,
                max_risk_pct,
            })
        }
        "fixed_quantity" => {
            let quantity = read_optional_positive(config, RISK, "quantity")?
                .ok_or_else(|| BarsimError::missing(RISK, "quantity"))?;
            Ok(PositionSizing::FixedQuantity(quantity))
        }
        other => Err(BarsimError::invalid(
            RISK,
            "sizing",
            format!("unknown sizing '{other}', expected fixed_fraction, risk_percent or fixed_quantity"),
        )),
    }
}

pub fn load_exit_policy(config: &dyn ConfigPort) -> Result<ExitPolicy, BarsimError> {
    let defaults = ExitPolicy::default();
    let targets = match read_string(config, RISK, "targets") {
        None => defaults.targets,
        Some(raw) => parse_targets(&raw).map_err(|r| BarsimError::invalid(RISK, "targets", r))?,
    };
    Ok(ExitPolicy {
        stop: read_parsed::<Distance>(config, RISK, "stop")?.unwrap_or(defaults.stop),
        targets,
        max_hold_bars: read_optional_count(config, RISK, "max_hold_bars")?,
        exit_on_opposite_signal: read_bool(
            config,
            RISK,
            "exit_on_opposite_signal",
            defaults.exit_on_opposite_signal,
        )?,
        trailing: read_parsed::<Distance>(config, RISK, "trailing")?,
        breakeven_after_partials: read_optional_count(config, RISK, "breakeven_after_partials")?,
    })
}

pub fn load_scale_policy(config: &dyn ConfigPort) -> Result<ScalePolicy, BarsimError> {
    let defaults = ScalePolicy::default();
    let max_fills = read_usize(config, RISK, "max_fills", defaults.max_fills)?;
    if max_fills == 0 {
        return Err(BarsimError::invalid(RISK, "max_fills", "must be at least 1"));
    }
    let allocations = match read_string(config, RISK, "allocations") {
        None => defaults.allocations,
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
                _ => Err(BarsimError::invalid(
                    RISK,
                    "allocations",
                    format!("allocation '{s}' must be a positive number"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(ScalePolicy {
        max_fills,
        step: read_parsed::<Distance>(config, RISK, "scale_step")?.unwrap_or(defaults.step),
        allocations,
        stop_anchor: read_parsed::<StopAnchor>(config, RISK, "stop_anchor")?
            .unwrap_or(defaults.stop_anchor),
        breakeven_target_after_fills: read_optional_count(
            config,
            RISK,
            "breakeven_target_after_fills",
        )?,
    })
}

/// Builds the full strategy from `[strategy]`, `[indicators]` and `[risk]`.
pub fn load_strategy(config: &dyn ConfigPort) -> Result<Strategy, BarsimError> {
    let rules = load_rules(config)?;
    let name = read_string(config, STRATEGY, "name").unwrap_or_else(|| rules.names().join("+"));
    let mut strategy = Strategy::new(name, rules);
    strategy.indicators = load_indicator_params(config)?;
    strategy.entry = read_parsed::<EntryMode>(config, STRATEGY, "entry")?.unwrap_or(EntryMode::Market);
    strategy.sizing = load_sizing(config)?;
    strategy.exit = load_exit_policy(config)?;
    strategy.scaling = load_scale_policy(config)?;
    Ok(strategy)
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BarsimError> {
    load_backtest_config(config).map(|_| ())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), BarsimError> {
    load_indicator_params(config).map(|_| ())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), BarsimError> {
    load_rules(config)?;
    read_parsed::<EntryMode>(config, STRATEGY, "entry")?;
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), BarsimError> {
    load_sizing(config)?;
    load_exit_policy(config)?;
    load_scale_policy(config)?;
    Ok(())
}

pub fn validate_all(config: &dyn ConfigPort) -> Result<(), BarsimError> {
    validate_backtest_config(config)?;
    validate_indicator_config(config)?;
    validate_strategy_config(config)?;
    validate_risk_config(config)?;
    Ok(())
}
