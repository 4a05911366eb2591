//! CLI definition and dispatch.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::markdown_report::{format_metrics_table, MarkdownReport};
use crate::adapters::retrying_source::{RetryPolicy, RetryingSource};
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::candle::Candle;
use crate::domain::config_validation::{load_backtest_config, load_strategy, validate_all};
use crate::domain::error::BarsimError;
use crate::domain::metrics::Metrics;
use crate::domain::policy::parse_distance_list;
use crate::domain::sweep::{run_sweep, SweepGrid, SweepResult};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::CandleSource;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "barsim", version, about = "Bar-by-bar crypto strategy backtester")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Candle CSV file, or a directory holding `<symbol>.csv`
        #[arg(short, long)]
        data: PathBuf,
        /// Directory for trades.csv and summary.md
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate config and data without simulating
        #[arg(long)]
        dry_run: bool,
    },
    /// Grid-search stop, target and max-hold settings
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Stop distances, e.g. `pct:1,pct:2,atr:1.5`
        #[arg(long)]
        stops: Option<String>,
        /// Target distances, e.g. `atr:2,atr:3`
        #[arg(long)]
        targets: Option<String>,
        /// Max-hold bar counts, 0 for no limit, e.g. `0,24,48`
        #[arg(long)]
        holds: Option<String>,
        /// Rows to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show bar count and time range of candle data
    Info {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
            dry_run,
        } => {
            if dry_run {
                cmd_dry_run(&config, &data)
            } else {
                cmd_backtest(&config, &data, output.as_deref())
            }
        }
        Command::Sweep {
            config,
            data,
            stops,
            targets,
            holds,
            top,
        } => cmd_sweep(
            &config,
            &data,
            stops.as_deref(),
            targets.as_deref(),
            holds.as_deref(),
            top,
        ),
        Command::Validate { config } => cmd_validate(&config),
        Command::Info { data, symbol } => cmd_info(&data, symbol.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BarsimError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

pub fn load_candles(data: &Path, config: &BacktestConfig) -> Result<Vec<Candle>, BarsimError> {
    let source = RetryingSource::new(CsvAdapter::new(data.to_path_buf()), RetryPolicy::default());
    let candles = source.fetch_candles(&config.symbol, config.start, config.end)?;
    info!(symbol = %config.symbol, bars = candles.len(), "candles loaded");
    Ok(candles)
}

/// Validates, loads data, simulates and optionally writes the report.
pub fn run_backtest_pipeline(
    config: &dyn ConfigPort,
    data: &Path,
    output: Option<&Path>,
) -> Result<(BacktestResult, Metrics), BarsimError> {
    validate_all(config)?;
    let backtest_config = load_backtest_config(config)?;
    let strategy = load_strategy(config)?;
    info!(strategy = %strategy.name, rules = ?strategy.rules.names(), "strategy loaded");

    let candles = load_candles(data, &backtest_config)?;
    let result = run_backtest(&candles, &strategy, &backtest_config)?;
    let metrics = Metrics::from_result(&result, backtest_config.periods_per_year);
    info!(
        trades = metrics.total_trades,
        final_equity = metrics.final_equity,
        "backtest finished"
    );

    if let Some(dir) = output {
        MarkdownReport.write(&result, &metrics, &strategy, dir)?;
    }
    Ok((result, metrics))
}

fn parse_holds(raw: &str) -> Result<Vec<Option<usize>>, BarsimError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map(|bars| (bars > 0).then_some(bars))
                .map_err(|_| BarsimError::invalid("sweep", "holds", format!("invalid bar count '{s}'")))
        })
        .collect()
}

pub fn parse_sweep_grid(
    stops: Option<&str>,
    targets: Option<&str>,
    holds: Option<&str>,
) -> Result<SweepGrid, BarsimError> {
    let distances = |key: &str, raw: Option<&str>| {
        raw.map(|r| parse_distance_list(r).map_err(|reason| BarsimError::invalid("sweep", key, reason)))
            .transpose()
            .map(Option::unwrap_or_default)
    };
    Ok(SweepGrid {
        stops: distances("stops", stops)?,
        targets: distances("targets", targets)?,
        max_holds: holds.map(parse_holds).transpose()?.unwrap_or_default(),
    })
}

pub fn run_sweep_pipeline(
    config: &dyn ConfigPort,
    data: &Path,
    grid: &SweepGrid,
) -> Result<Vec<SweepResult>, BarsimError> {
    validate_all(config)?;
    let backtest_config = load_backtest_config(config)?;
    let strategy = load_strategy(config)?;
    let candles = load_candles(data, &backtest_config)?;
    run_sweep(&candles, &strategy, &backtest_config, grid)
}

pub fn format_sweep_table(results: &[SweepResult], top: usize) -> String {
    let mut out = String::from(
        "| Rank | Stop | Target | Max hold | Trades | Win rate | Return | Max DD | Return/DD |\n\
         |---|---|---|---|---|---|---|---|---|\n",
    );
    for (rank, r) in results.iter().take(top).enumerate() {
        let m = &r.metrics;
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {:.1}% | {:.2}% | {:.2}% | {:.2} |",
            rank + 1,
            r.stop,
            r.target.map_or_else(|| "base".to_string(), |t| t.to_string()),
            r.max_hold_bars.map_or_else(|| "none".to_string(), |b| b.to_string()),
            m.total_trades,
            m.win_rate * 100.0,
            m.total_return * 100.0,
            m.max_drawdown * 100.0,
            m.return_dd_ratio,
        );
    }
    out
}

fn cmd_backtest(config_path: &Path, data: &Path, output: Option<&Path>) -> Result<(), BarsimError> {
    let config = load_config(config_path)?;
    let (result, metrics) = run_backtest_pipeline(&config, data, output)?;
    println!("{}", format_metrics_table(&metrics));
    if let Some(position) = &result.open_position {
        println!(
            "Open position at end of data: {} {:.8} @ {:.8}",
            position.direction,
            position.remaining_size(),
            position.average_entry()
        );
    }
    Ok(())
}

fn cmd_dry_run(config_path: &Path, data: &Path) -> Result<(), BarsimError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    let backtest_config = load_backtest_config(&config)?;
    let strategy = load_strategy(&config)?;
    let candles = load_candles(data, &backtest_config)?;

    let warmup = strategy.warmup();
    if candles.len() < warmup {
        return Err(BarsimError::InsufficientData {
            bars: candles.len(),
            minimum: warmup,
        });
    }
    println!("strategy: {}", strategy.name);
    println!("rules: {}", strategy.rules.names().join(", "));
    println!("entry: {}", strategy.entry);
    println!("symbol: {}", backtest_config.symbol);
    println!("bars: {} (warm-up {warmup})", candles.len());
    println!("dry run complete: configuration is valid");
    Ok(())
}

fn cmd_sweep(
    config_path: &Path,
    data: &Path,
    stops: Option<&str>,
    targets: Option<&str>,
    holds: Option<&str>,
    top: usize,
) -> Result<(), BarsimError> {
    let config = load_config(config_path)?;
    let grid = parse_sweep_grid(stops, targets, holds)?;
    let results = run_sweep_pipeline(&config, data, &grid)?;
    println!("{}", format_sweep_table(&results, top));
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), BarsimError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    println!("configuration is valid");
    Ok(())
}

fn cmd_info(data: &Path, symbol: Option<&str>) -> Result<(), BarsimError> {
    let adapter = CsvAdapter::new(data.to_path_buf());
    let symbols = match symbol {
        Some(s) => vec![s.to_string()],
        None => adapter.list_symbols()?,
    };
    for symbol in symbols {
        match adapter.data_range(&symbol)? {
            Some((first, last, bars)) => println!("{symbol}: {bars} bars, {first} to {last}"),
            None => println!("{symbol}: no data"),
        }
    }
    Ok(())
}
