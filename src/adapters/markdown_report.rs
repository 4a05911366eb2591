//! Markdown summary and CSV trade log report.
//!
//! Writes two files into the output directory:
//! - `trades.csv`: one row per closed trade
//! - `summary.md`: strategy settings, metrics table, exit breakdown and
//!   monthly returns

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::Datelike;
use tracing::info;

use crate::adapters::csv_adapter::write_trades;
use crate::domain::backtest::{BacktestResult, EquityPoint};
use crate::domain::error::BarsimError;
use crate::domain::metrics::Metrics;
use crate::domain::position::ExitReason;
use crate::domain::strategy::Strategy;
use crate::ports::report_port::ReportPort;

pub const TRADES_FILE: &str = "trades.csv";
pub const SUMMARY_FILE: &str = "summary.md";

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownReport;

impl ReportPort for MarkdownReport {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &Strategy,
        output_dir: &Path,
    ) -> Result<(), BarsimError> {
        fs::create_dir_all(output_dir)?;

        let trades_path = output_dir.join(TRADES_FILE);
        write_trades(&result.trades, fs::File::create(&trades_path)?)?;

        let summary_path = output_dir.join(SUMMARY_FILE);
        fs::write(&summary_path, render_summary(result, metrics, strategy))?;

        info!(
            trades = %trades_path.display(),
            summary = %summary_path.display(),
            "report written"
        );
        Ok(())
    }
}

fn ratio(value: f64) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{value:.2}")
    }
}

/// Two-column markdown table of the headline metrics.
pub fn format_metrics_table(metrics: &Metrics) -> String {
    let rows = [
        ("Total trades", metrics.total_trades.to_string()),
        ("Won / lost / flat", format!(
            "{} / {} / {}",
            metrics.trades_won, metrics.trades_lost, metrics.trades_breakeven
        )),
        ("Win rate", format!("{:.2}%", metrics.win_rate * 100.0)),
        ("Average win", format!("{:.2}", metrics.avg_win)),
        ("Average loss", format!("{:.2}", metrics.avg_loss)),
        ("Largest win", format!("{:.2}", metrics.largest_win)),
        ("Largest loss", format!("{:.2}", metrics.largest_loss)),
        ("Profit factor", ratio(metrics.profit_factor)),
        ("Average bars held", format!("{:.1}", metrics.avg_bars_held)),
        ("Final equity", format!("{:.2}", metrics.final_equity)),
        ("Total return", format!("{:.2}%", metrics.total_return * 100.0)),
        ("Max drawdown", format!("{:.2}%", metrics.max_drawdown * 100.0)),
        ("Max drawdown duration", format!("{} bars", metrics.max_drawdown_duration)),
        ("Return / drawdown", ratio(metrics.return_dd_ratio)),
        ("Sharpe ratio", format!("{:.2}", metrics.sharpe_ratio)),
        ("Sortino ratio", ratio(metrics.sortino_ratio)),
    ];

    let mut out = String::from("| Metric | Value |\n|---|---|\n");
    for (name, value) in rows {
        let _ = writeln!(out, "| {name} | {value} |");
    }
    out
}

/// Month-end equity change, keyed by (year, month). The first month is
/// measured against its own opening equity.
pub fn monthly_returns(equity_curve: &[EquityPoint]) -> Vec<((i32, u32), f64)> {
    let mut months: BTreeMap<(i32, u32), (f64, f64)> = BTreeMap::new();
    for point in equity_curve {
        let key = (point.timestamp.year(), point.timestamp.month());
        let entry = months.entry(key).or_insert((point.equity, point.equity));
        entry.1 = point.equity;
    }

    let mut returns = Vec::with_capacity(months.len());
    let mut previous_close: Option<f64> = None;
    for (key, (open, close)) in months {
        let reference = previous_close.unwrap_or(open);
        let change = if reference > 0.0 {
            (close - reference) / reference
        } else {
            0.0
        };
        returns.push((key, change));
        previous_close = Some(close);
    }
    returns
}

pub fn render_summary(result: &BacktestResult, metrics: &Metrics, strategy: &Strategy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Backtest: {}\n", strategy.name);

    let _ = writeln!(out, "## Strategy\n");
    let _ = writeln!(out, "- Rules: {}", strategy.rules.names().join(", "));
    let _ = writeln!(out, "- Entry: {}", strategy.entry);
    let _ = writeln!(out, "- Sizing: {:?}", strategy.sizing);
    let _ = writeln!(out, "- Stop: {}", strategy.exit.stop);
    let targets: Vec<String> = strategy
        .exit
        .targets
        .iter()
        .map(|t| format!("{}@{}", t.distance, t.fraction))
        .collect();
    let _ = writeln!(out, "- Targets: {}", if targets.is_empty() { "none".to_string() } else { targets.join(", ") });
    if let Some(bars) = strategy.exit.max_hold_bars {
        let _ = writeln!(out, "- Max hold: {bars} bars");
    }
    if strategy.scaling.enabled() {
        let _ = writeln!(
            out,
            "- Scaling: up to {} fills every {}",
            strategy.scaling.max_fills, strategy.scaling.step
        );
    }
    let _ = writeln!(out, "- Bars simulated: {}\n", result.equity_curve.len());

    let _ = writeln!(out, "## Metrics\n");
    out.push_str(&format_metrics_table(metrics));

    let _ = writeln!(out, "\n## Exits\n");
    out.push_str("| Reason | Count |\n|---|---|\n");
    for reason in ExitReason::ALL {
        let _ = writeln!(out, "| {reason} | {} |", metrics.exits.get(reason));
    }

    let months = monthly_returns(&result.equity_curve);
    if !months.is_empty() {
        let _ = writeln!(out, "\n## Monthly returns\n");
        out.push_str("| Month | Return |\n|---|---|\n");
        for ((year, month), change) in months {
            let _ = writeln!(out, "| {year}-{month:02} | {:.2}% |", change * 100.0);
        }
    }

    if let Some(position) = &result.open_position {
        let _ = writeln!(
            out,
            "\n_Open at end of data: {} {:.8} @ {:.8} ({} fills)._",
            position.direction,
            position.remaining_size(),
            position.average_entry(),
            position.fill_count()
        );
    }
    out
}
