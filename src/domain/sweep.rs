//! Exit-parameter grid search.
//!
//! Runs the same strategy over the cartesian product of stop distances,
//! target distances and max-hold values. Indicators are computed once and
//! shared by every run. Results are ranked by return/drawdown ratio,
//! descending; equal ratios keep grid order.

use tracing::{debug, info};

use crate::domain::backtest::{simulate, BacktestConfig};
use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;
use crate::domain::indicator::IndicatorFrame;
use crate::domain::metrics::Metrics;
use crate::domain::policy::{Distance, TargetSpec};
use crate::domain::strategy::Strategy;

/// Empty dimensions fall back to the base strategy's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepGrid {
    pub stops: Vec<Distance>,
    pub targets: Vec<Distance>,
    pub max_holds: Vec<Option<usize>>,
}

impl SweepGrid {
    pub fn combinations(&self) -> usize {
        self.stops.len().max(1) * self.targets.len().max(1) * self.max_holds.len().max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub stop: Distance,
    /// `None` when the base strategy's target ladder was kept.
    pub target: Option<Distance>,
    pub max_hold_bars: Option<usize>,
    pub metrics: Metrics,
}

pub fn run_sweep(
    candles: &[Candle],
    base: &Strategy,
    config: &BacktestConfig,
    grid: &SweepGrid,
) -> Result<Vec<SweepResult>, BarsimError> {
    let frame = IndicatorFrame::compute(candles, &base.indicators)?;

    let stops = if grid.stops.is_empty() {
        vec![base.exit.stop]
    } else {
        grid.stops.clone()
    };
    let targets: Vec<Option<Distance>> = if grid.targets.is_empty() {
        vec![None]
    } else {
        grid.targets.iter().copied().map(Some).collect()
    };
    let holds = if grid.max_holds.is_empty() {
        vec![base.exit.max_hold_bars]
    } else {
        grid.max_holds.clone()
    };

    info!(runs = grid.combinations(), bars = candles.len(), "starting sweep");

    let mut results = Vec::with_capacity(grid.combinations());
    for &stop in &stops {
        for &target in &targets {
            for &max_hold_bars in &holds {
                let mut strategy = base.clone();
                strategy.exit.stop = stop;
                strategy.exit.max_hold_bars = max_hold_bars;
                if let Some(distance) = target {
                    strategy.exit.targets = vec![TargetSpec {
                        distance,
                        fraction: 1.0,
                    }];
                }

                let result = simulate(candles, &frame, &strategy, config)?;
                let metrics = Metrics::from_result(&result, config.periods_per_year);
                debug!(
                    stop = %stop,
                    target = ?target.map(|t| t.to_string()),
                    max_hold = ?max_hold_bars,
                    trades = metrics.total_trades,
                    return_dd = metrics.return_dd_ratio,
                    "sweep run finished"
                );
                results.push(SweepResult {
                    stop,
                    target,
                    max_hold_bars,
                    metrics,
                });
            }
        }
    }

    results.sort_by(|a, b| {
        b.metrics
            .return_dd_ratio
            .total_cmp(&a.metrics.return_dd_ratio)
    });
    Ok(results)
}
