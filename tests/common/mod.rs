#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use barsim::domain::candle::Candle;
use barsim::domain::signal::{BarContext, Direction, Signal, SignalRule};
use chrono::{Duration, NaiveDate, NaiveDateTime};

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Hourly candle `index` bars after `start_time()`, with the wicks a quarter
/// point beyond the body.
pub fn make_candle(index: usize, open: f64, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp: start_time() + Duration::hours(index as i64),
        open,
        high: open.max(close) + 0.25,
        low: open.min(close) - 0.25,
        close,
        volume,
    }
}

/// Candles whose open is the previous close.
pub fn candles_from_closes(closes: &[f64], volumes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            make_candle(i, open, close, volume)
        })
        .collect()
}

/// 100-bar uptrend (+0.5 per bar) with one engineered dip at `dip_bar`:
/// close 20 points under the trend on triple volume.
pub fn uptrend_with_dip(dip_bar: usize) -> Vec<Candle> {
    let mut closes: Vec<f64> = (0..100).map(|i| 100.0 + 0.5 * i as f64).collect();
    let mut volumes = vec![1_000.0; 100];
    closes[dip_bar] -= 20.0;
    volumes[dip_bar] = 3_000.0;
    candles_from_closes(&closes, &volumes)
}

pub fn write_csv(dir: &Path, name: &str, candles: &[Candle]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
    for c in candles {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            c.timestamp.format("%Y-%m-%d %H:%M:%S"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        )
        .unwrap();
    }
    path
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Fires the given direction on every listed bar.
#[derive(Debug)]
pub struct ScriptedRule {
    pub bars: Vec<usize>,
    pub direction: Direction,
    pub stop_distance: f64,
    pub target_distance: f64,
}

impl ScriptedRule {
    pub fn new(bars: Vec<usize>, direction: Direction) -> Self {
        Self {
            bars,
            direction,
            stop_distance: 5.0,
            target_distance: 10.0,
        }
    }
}

impl SignalRule for ScriptedRule {
    fn name(&self) -> &str {
        "scripted"
    }

    fn evaluate(&self, ctx: &BarContext<'_>) -> Option<Signal> {
        self.bars.contains(&ctx.index()).then(|| Signal {
            direction: self.direction,
            suggested_stop_distance: self.stop_distance,
            suggested_target_distance: self.target_distance,
            confidence: 1.0,
            rule: "scripted".to_string(),
        })
    }
}

/// Fires on every bar it is asked about.
#[derive(Debug)]
pub struct AlwaysLong;

impl SignalRule for AlwaysLong {
    fn name(&self) -> &str {
        "always_long"
    }

    fn evaluate(&self, _ctx: &BarContext<'_>) -> Option<Signal> {
        Some(Signal {
            direction: Direction::Long,
            suggested_stop_distance: 1.0,
            suggested_target_distance: 1.0,
            confidence: 0.5,
            rule: "always_long".to_string(),
        })
    }
}

pub const VALID_INI: &str = r#"
[backtest]
symbol = BTCUSDT
initial_capital = 10000
fee_pct = 0.05
slippage_pct = 0.02
leverage = 1
periods_per_year = 8760

[indicators]
rsi_period = 14
atr_period = 14
bb_period = 20
bb_std = 2.0
volume_period = 20
ema_fast = 9
ema_slow = 21

[strategy]
name = Dip Buyer
rules = mean_reversion
allow_short = false
entry = market

[risk]
sizing = fixed_fraction
position_fraction = 0.5
stop = signal
targets = signal
"#;
