//! CSV candle reader and trade writer.
//!
//! Columns are located by header name, case-insensitively. The time column
//! may be called `timestamp`, `date`, `datetime`, `time` or `open_time` and
//! hold either ISO-8601 text or epoch milliseconds. Integer times below
//! [`MIN_EPOCH_MILLIS`] (March 1973) are rejected, which catches files stamped
//! in epoch seconds instead of silently reading them as 1970 dates.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::domain::candle::{from_epoch_millis, parse_timestamp, Candle};
use crate::domain::error::BarsimError;
use crate::domain::position::Trade;
use crate::ports::data_port::CandleSource;

const TIME_COLUMNS: [&str; 5] = ["timestamp", "date", "datetime", "time", "open_time"];

/// Smallest integer time accepted as epoch milliseconds (1973-03-03).
pub const MIN_EPOCH_MILLIS: i64 = 100_000_000_000;

/// Reads candles from a single CSV file, or from `<dir>/<symbol>.csv`.
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        if self.base_path.is_dir() {
            self.base_path.join(format!("{symbol}.csv"))
        } else {
            self.base_path.clone()
        }
    }

    /// Symbols available in a data directory, from `*.csv` file stems.
    pub fn list_symbols(&self) -> Result<Vec<String>, BarsimError> {
        if !self.base_path.is_dir() {
            return Ok(self
                .base_path
                .file_stem()
                .map(|s| vec![s.to_string_lossy().into_owned()])
                .unwrap_or_default());
        }
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

impl CandleSource for CsvAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BarsimError> {
        let path = self.csv_path(symbol);
        let file = fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BarsimError::NoData {
                symbol: symbol.to_string(),
            },
            _ => BarsimError::Io(e),
        })?;

        let candles: Vec<Candle> = read_candles(file)?
            .into_iter()
            .filter(|c| start.is_none_or(|s| c.timestamp >= s))
            .filter(|c| end.is_none_or(|e| c.timestamp <= e))
            .collect();
        if candles.is_empty() {
            return Err(BarsimError::NoData {
                symbol: symbol.to_string(),
            });
        }
        debug!(path = %path.display(), bars = candles.len(), "loaded candles");
        Ok(candles)
    }
}

struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, BarsimError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |wanted: &str| {
            names
                .iter()
                .position(|n| n == wanted)
                .ok_or_else(|| BarsimError::DataParse {
                    reason: format!("missing '{wanted}' column"),
                })
        };
        let time = TIME_COLUMNS
            .iter()
            .find_map(|wanted| names.iter().position(|n| n == wanted))
            .ok_or_else(|| BarsimError::DataParse {
                reason: format!("missing time column, expected one of {}", TIME_COLUMNS.join(", ")),
            })?;
        Ok(Columns {
            time,
            open: find("open")?,
            high: find("high")?,
            low: find("low")?,
            close: find("close")?,
            volume: find("volume")?,
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, line: u64) -> Result<&'r str, BarsimError> {
    record.get(index).ok_or_else(|| BarsimError::DataParse {
        reason: format!("line {line}: missing column {}", index + 1),
    })
}

fn number(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, BarsimError> {
    let raw = field(record, index, line)?;
    raw.parse().map_err(|_| BarsimError::DataParse {
        reason: format!("line {line}: invalid {name} value '{raw}'"),
    })
}

fn time_value(raw: &str, line: u64) -> Result<NaiveDateTime, BarsimError> {
    let parsed = match raw.parse::<i64>() {
        Ok(millis) if millis < MIN_EPOCH_MILLIS => {
            return Err(BarsimError::DataParse {
                reason: format!(
                    "line {line}: integer timestamp '{raw}' is not epoch milliseconds (seconds?)"
                ),
            });
        }
        Ok(millis) => from_epoch_millis(millis),
        Err(_) => parse_timestamp(raw),
    };
    parsed.ok_or_else(|| BarsimError::DataParse {
        reason: format!("line {line}: invalid timestamp '{raw}'"),
    })
}

/// Parses candles from CSV text, sorted ascending with duplicate
/// timestamps removed (first occurrence kept).
pub fn read_candles<R: Read>(reader: R) -> Result<Vec<Candle>, BarsimError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers().map_err(|e| BarsimError::DataParse {
        reason: format!("CSV header error: {e}"),
    })?;
    let columns = Columns::locate(headers)?;

    let mut candles = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| BarsimError::DataParse {
            reason: format!("CSV parse error: {e}"),
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let candle = Candle {
            timestamp: time_value(field(&record, columns.time, line)?, line)?,
            open: number(&record, columns.open, "open", line)?,
            high: number(&record, columns.high, "high", line)?,
            low: number(&record, columns.low, "low", line)?,
            close: number(&record, columns.close, "close", line)?,
            volume: number(&record, columns.volume, "volume", line)?,
        };
        if !candle.is_consistent() {
            return Err(BarsimError::DataParse {
                reason: format!("line {line}: inconsistent OHLCV values"),
            });
        }
        candles.push(candle);
    }

    // Stable sort keeps the first of any duplicate timestamps in front.
    candles.sort_by_key(|c| c.timestamp);
    let before = candles.len();
    candles.dedup_by_key(|c| c.timestamp);
    let dropped = before - candles.len();
    if dropped > 0 {
        warn!(dropped, "dropped candles with duplicate timestamps");
    }
    Ok(candles)
}

/// Writes one row per closed trade.
pub fn write_trades<W: Write>(trades: &[Trade], writer: W) -> Result<(), BarsimError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let to_err = |e: csv::Error| BarsimError::DataParse {
        reason: format!("CSV write error: {e}"),
    };
    wtr.write_record([
        "entry_time",
        "exit_time",
        "direction",
        "entry_price",
        "exit_price",
        "size",
        "pnl_pct",
        "pnl",
        "fees",
        "exit_reason",
        "bars_held",
        "fills",
        "rule",
    ])
    .map_err(to_err)?;
    for trade in trades {
        wtr.write_record([
            trade.entry_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            trade.exit_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            trade.direction.to_string(),
            format!("{:.8}", trade.average_entry),
            format!("{:.8}", trade.exit_price),
            format!("{:.8}", trade.size),
            format!("{:.4}", trade.pnl_pct),
            format!("{:.4}", trade.pnl_dollars),
            format!("{:.4}", trade.fees),
            trade.exit_reason.to_string(),
            trade.bars_held.to_string(),
            trade.fills.to_string(),
            trade.rule.clone(),
        ])
        .map_err(to_err)?;
    }
    wtr.flush()?;
    Ok(())
}
