//! Performance metrics over trades and the equity curve.
//!
//! Degenerate inputs map to fixed sentinels instead of errors:
//! profit factor is `+inf` with wins and no losses and `0` with no trades;
//! the return/drawdown ratio is `0` when drawdown is `0`.

use crate::domain::backtest::{BacktestResult, EquityPoint};
use crate::domain::position::{ExitReason, Trade};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitCounts {
    pub stop_loss: usize,
    pub take_profit: usize,
    pub time_exit: usize,
    pub opposite_signal: usize,
}

impl ExitCounts {
    pub fn get(&self, reason: ExitReason) -> usize {
        match reason {
            ExitReason::StopLoss => self.stop_loss,
            ExitReason::TakeProfit => self.take_profit,
            ExitReason::TimeExit => self.time_exit,
            ExitReason::OppositeSignal => self.opposite_signal,
        }
    }

    fn record(&mut self, reason: ExitReason) {
        match reason {
            ExitReason::StopLoss => self.stop_loss += 1,
            ExitReason::TakeProfit => self.take_profit += 1,
            ExitReason::TimeExit => self.time_exit += 1,
            ExitReason::OppositeSignal => self.opposite_signal += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_bars_held: f64,
    pub exits: ExitCounts,
    pub final_equity: f64,
    /// Fractional return on initial capital.
    pub total_return: f64,
    /// Most negative `(equity - running_max) / running_max`; 0 or negative.
    pub max_drawdown: f64,
    /// Longest stretch of bars spent below a previous peak.
    pub max_drawdown_duration: usize,
    pub return_dd_ratio: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl Metrics {
    pub fn from_result(result: &BacktestResult, periods_per_year: f64) -> Self {
        Self::compute(
            &result.trades,
            &result.equity_curve,
            result.initial_capital,
            periods_per_year,
        )
    }

    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let return_dd_ratio = if max_drawdown == 0.0 {
            0.0
        } else {
            total_return / max_drawdown.abs()
        };

        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, periods_per_year);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_bars = 0usize;
        let mut exits = ExitCounts::default();

        for trade in trades {
            let pnl = trade.pnl_dollars;
            if pnl > 0.0 {
                trades_won += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                gross_loss += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_bars += trade.bars_held;
            exits.record(trade.exit_reason);
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            gross_profit / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            gross_loss / trades_lost as f64
        } else {
            0.0
        };

        let avg_bars_held = if total_trades > 0 {
            total_bars as f64 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            gross_profit,
            gross_loss,
            profit_factor,
            avg_bars_held,
            exits,
            final_equity,
            total_return,
            max_drawdown,
            max_drawdown_duration,
            return_dd_ratio,
            sharpe_ratio,
            sortino_ratio,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (point.equity - peak) / peak;
            max_dd = max_dd.min(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], periods_per_year: f64) -> (f64, f64) {
    if equity_curve.len() < 2 || periods_per_year <= 0.0 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualise = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        mean / stddev * annualise
    } else {
        0.0
    };

    let downside = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();

    let sortino = if downside_stddev > 0.0 {
        mean / downside_stddev * annualise
    } else {
        0.0
    };

    (sharpe, sortino)
}
