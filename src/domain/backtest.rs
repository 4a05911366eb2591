//! Backtest configuration, results and the top-level run function.

use chrono::NaiveDateTime;
use tracing::info;

use crate::domain::candle::Candle;
use crate::domain::cost::CostModel;
use crate::domain::error::BarsimError;
use crate::domain::indicator::IndicatorFrame;
use crate::domain::position::{Position, Trade};
use crate::domain::simulator::{EngineEvent, ExecutionSimulator};
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub initial_capital: f64,
    pub costs: CostModel,
    pub leverage: f64,
    /// Orders below this notional are not placed.
    pub min_notional: f64,
    /// Bars per year, used to annualise the Sharpe ratio.
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: "BTCUSDT".to_string(),
            start: None,
            end: None,
            initial_capital: 10_000.0,
            costs: CostModel::default(),
            leverage: 1.0,
            min_notional: 10.0,
            periods_per_year: 8_760.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    /// Distance below the running peak, in percent (0 or negative).
    pub drawdown_pct: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub initial_capital: f64,
    /// Realised capital after the last bar; excludes any open position.
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub events: Vec<EngineEvent>,
    /// Position still open after the last bar, left unclosed.
    pub open_position: Option<Position>,
}

impl BacktestResult {
    /// Marked-to-market equity at the last bar.
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.final_capital)
    }
}

/// Computes indicators and simulates `strategy` over `candles`.
pub fn run_backtest(
    candles: &[Candle],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, BarsimError> {
    let frame = IndicatorFrame::compute(candles, &strategy.indicators)?;
    info!(
        bars = candles.len(),
        warmup = strategy.warmup(),
        strategy = %strategy.name,
        "running backtest"
    );
    simulate(candles, &frame, strategy, config)
}

/// Simulates over a precomputed frame; used when many runs share indicators.
pub fn simulate(
    candles: &[Candle],
    frame: &IndicatorFrame,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, BarsimError> {
    let simulator = ExecutionSimulator::new(candles, frame, strategy, config)?;
    Ok(simulator.run())
}
