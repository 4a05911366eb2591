//! Open position state and closed trades.
//!
//! A [`Position`] is only mutated through `add_fill`, `update_stop` and
//! `reduce`, which keep its invariants:
//!
//! - the average entry is the cost basis of the open size: fills blend into
//!   it, exits realize P&L against it and leave it unchanged;
//! - trailing and breakeven stop updates may only reduce risk;
//! - a scale-in is the only way the stop can move away from price.

use std::fmt;

use chrono::NaiveDateTime;

use crate::domain::candle::Candle;
use crate::domain::signal::{Direction, Signal};

/// Remaining size below this is treated as fully closed.
pub const SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub bar: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetLevel {
    pub price: f64,
    /// Share of the total filled size closed when the level is hit.
    pub fraction: f64,
    pub hit: bool,
}

impl TargetLevel {
    pub fn new(price: f64, fraction: f64) -> Self {
        TargetLevel {
            price,
            fraction,
            hit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopUpdate {
    Trail,
    Breakeven,
    ScaleIn,
}

impl fmt::Display for StopUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopUpdate::Trail => f.write_str("trail"),
            StopUpdate::Breakeven => f.write_str("breakeven"),
            StopUpdate::ScaleIn => f.write_str("scale_in"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeExit,
    OppositeSignal,
}

impl ExitReason {
    pub const ALL: [ExitReason; 4] = [
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::TimeExit,
        ExitReason::OppositeSignal,
    ];
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::TimeExit => "TIME_EXIT",
            ExitReason::OppositeSignal => "OPPOSITE_SIGNAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Position {
    pub direction: Direction,
    pub opened_bar: usize,
    pub opened_at: NaiveDateTime,
    /// ATR at the signal bar; ATR-based distances stay anchored to it.
    pub entry_atr: f64,
    pub signal: Signal,
    /// Cumulative risk committed across fills, in percent of capital.
    pub committed_risk_pct: f64,
    fills: Vec<Fill>,
    remaining: f64,
    average_entry: f64,
    stop_loss: f64,
    targets: Vec<TargetLevel>,
    realized_pnl: f64,
    fees_paid: f64,
    exit_size: f64,
    exit_notional: f64,
    partial_exits: usize,
    best_price: f64,
}

impl Position {
    pub fn open(
        signal: Signal,
        fill: Fill,
        stop_loss: f64,
        targets: Vec<TargetLevel>,
        entry_atr: f64,
    ) -> Self {
        Position {
            direction: signal.direction,
            opened_bar: fill.bar,
            opened_at: fill.timestamp,
            entry_atr,
            signal,
            committed_risk_pct: 0.0,
            remaining: fill.size,
            average_entry: fill.price,
            fees_paid: fill.fee,
            best_price: fill.price,
            fills: vec![fill],
            stop_loss,
            targets,
            realized_pnl: 0.0,
            exit_size: 0.0,
            exit_notional: 0.0,
            partial_exits: 0,
        }
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    pub fn latest_fill(&self) -> &Fill {
        // a position is always opened with one fill and never loses fills
        &self.fills[self.fills.len() - 1]
    }

    pub fn filled_size(&self) -> f64 {
        self.fills.iter().map(|f| f.size).sum()
    }

    pub fn remaining_size(&self) -> f64 {
        self.remaining
    }

    pub fn is_closed(&self) -> bool {
        self.remaining <= SIZE_EPSILON
    }

    pub fn entry_notional(&self) -> f64 {
        self.fills.iter().map(|f| f.price * f.size).sum()
    }

    /// Cost basis of the size still open.
    pub fn average_entry(&self) -> f64 {
        self.average_entry
    }

    /// Size-weighted mean of every fill, including size already exited.
    pub fn mean_fill_price(&self) -> f64 {
        let size = self.filled_size();
        if size > 0.0 {
            self.entry_notional() / size
        } else {
            self.latest_fill().price
        }
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn targets(&self) -> &[TargetLevel] {
        &self.targets
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    pub fn partial_exits(&self) -> usize {
        self.partial_exits
    }

    /// Most favorable price seen since entry.
    pub fn best_price(&self) -> f64 {
        self.best_price
    }

    pub fn bars_held(&self, bar: usize) -> usize {
        bar.saturating_sub(self.opened_bar)
    }

    pub fn add_fill(&mut self, fill: Fill) {
        let open = self.remaining + fill.size;
        if open > SIZE_EPSILON {
            self.average_entry =
                (self.remaining * self.average_entry + fill.size * fill.price) / open;
        }
        self.remaining = open;
        self.fees_paid += fill.fee;
        self.fills.push(fill);
    }

    /// Moves the stop, returning whether it changed.
    ///
    /// `Trail` and `Breakeven` only apply when the new level is tighter than
    /// the current one. `ScaleIn` always applies.
    pub fn update_stop(&mut self, price: f64, kind: StopUpdate) -> bool {
        if !price.is_finite() || price == self.stop_loss {
            return false;
        }
        let tighter = match self.direction {
            Direction::Long => price > self.stop_loss,
            Direction::Short => price < self.stop_loss,
        };
        match kind {
            StopUpdate::ScaleIn => {}
            StopUpdate::Trail | StopUpdate::Breakeven if tighter => {}
            StopUpdate::Trail | StopUpdate::Breakeven => return false,
        }
        self.stop_loss = price;
        true
    }

    /// Closes up to `size` at `price`, returning the gross P&L of the slice
    /// against the current cost basis.
    pub fn reduce(&mut self, size: f64, price: f64, fee: f64) -> f64 {
        let size = size.min(self.remaining).max(0.0);
        let pnl = self.direction.sign() * (price - self.average_entry()) * size;

        self.remaining -= size;
        if self.remaining <= SIZE_EPSILON {
            self.remaining = 0.0;
        } else {
            self.partial_exits += 1;
        }
        self.realized_pnl += pnl;
        self.fees_paid += fee;
        self.exit_size += size;
        self.exit_notional += size * price;
        pnl
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.average_entry()) * self.remaining
    }

    pub fn mark_target_hit(&mut self, index: usize) {
        if let Some(level) = self.targets.get_mut(index) {
            level.hit = true;
        }
    }

    /// Replaces every unhit level; hit levels are kept for the record.
    pub fn replace_pending_targets(&mut self, levels: Vec<TargetLevel>) {
        self.targets.retain(|t| t.hit);
        self.targets.extend(levels);
    }

    pub fn is_stop_hit(&self, candle: &Candle) -> bool {
        match self.direction {
            Direction::Long => candle.low <= self.stop_loss,
            Direction::Short => candle.high >= self.stop_loss,
        }
    }

    /// The stop price, or the open when the bar gapped through the stop.
    pub fn stop_fill_price(&self, candle: &Candle) -> f64 {
        match self.direction {
            Direction::Long if candle.open <= self.stop_loss => candle.open,
            Direction::Short if candle.open >= self.stop_loss => candle.open,
            _ => self.stop_loss,
        }
    }

    pub fn is_target_hit(&self, level: &TargetLevel, candle: &Candle) -> bool {
        match self.direction {
            Direction::Long => candle.high >= level.price,
            Direction::Short => candle.low <= level.price,
        }
    }

    pub fn record_extreme(&mut self, candle: &Candle) {
        self.best_price = match self.direction {
            Direction::Long => self.best_price.max(candle.high),
            Direction::Short => self.best_price.min(candle.low),
        };
    }

    pub fn into_trade(self, exit_bar: usize, exit_time: NaiveDateTime, reason: ExitReason) -> Trade {
        let entry_notional = self.entry_notional();
        let pnl_dollars = self.realized_pnl - self.fees_paid;
        let exit_price = if self.exit_size > 0.0 {
            self.exit_notional / self.exit_size
        } else {
            f64::NAN
        };
        let pnl_pct = if entry_notional > 0.0 {
            pnl_dollars / entry_notional * 100.0
        } else {
            0.0
        };

        Trade {
            direction: self.direction,
            entry_time: self.opened_at,
            exit_time,
            entry_bar: self.opened_bar,
            exit_bar,
            average_entry: self.mean_fill_price(),
            exit_price,
            size: self.filled_size(),
            pnl_dollars,
            pnl_pct,
            fees: self.fees_paid,
            exit_reason: reason,
            bars_held: exit_bar.saturating_sub(self.opened_bar),
            fills: self.fills.len(),
            partial_exits: self.partial_exits,
            rule: self.signal.rule,
        }
    }
}

/// A fully closed position. Append-only once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_bar: usize,
    pub exit_bar: usize,
    /// Size-weighted mean of every entry fill.
    pub average_entry: f64,
    /// Size-weighted mean of every exit fill.
    pub exit_price: f64,
    pub size: f64,
    /// Net of all fees.
    pub pnl_dollars: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
    pub fills: usize,
    pub partial_exits: usize,
    pub rule: String,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl_dollars > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl_dollars < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn signal(direction: Direction) -> Signal {
        Signal {
            direction,
            suggested_stop_distance: 5.0,
            suggested_target_distance: 10.0,
            confidence: 0.5,
            rule: "test".into(),
        }
    }

    fn fill(bar: usize, price: f64, size: f64) -> Fill {
        Fill {
            bar,
            timestamp: ts(bar as u32),
            price,
            size,
            fee: 0.0,
        }
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts(0),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn long_position() -> Position {
        Position::open(
            signal(Direction::Long),
            fill(0, 100.0, 2.0),
            95.0,
            vec![TargetLevel::new(110.0, 0.5), TargetLevel::new(120.0, 0.5)],
            2.0,
        )
    }

    fn short_position() -> Position {
        Position::open(
            signal(Direction::Short),
            fill(0, 100.0, 1.0),
            105.0,
            vec![TargetLevel::new(90.0, 1.0)],
            2.0,
        )
    }

    #[test]
    fn average_entry_is_size_weighted() {
        let mut pos = long_position();
        pos.add_fill(fill(3, 90.0, 1.0));
        // (100*2 + 90*1) / 3
        assert!((pos.average_entry() - 290.0 / 3.0).abs() < 1e-10);
        assert!((pos.remaining_size() - 3.0).abs() < 1e-12);
        assert_eq!(pos.fill_count(), 2);
        assert_eq!(pos.latest_fill().price, 90.0);
    }

    #[test]
    fn trail_only_tightens_long() {
        let mut pos = long_position();
        assert!(!pos.update_stop(90.0, StopUpdate::Trail));
        assert_eq!(pos.stop_loss(), 95.0);
        assert!(pos.update_stop(97.0, StopUpdate::Trail));
        assert_eq!(pos.stop_loss(), 97.0);
    }

    #[test]
    fn breakeven_only_tightens_short() {
        let mut pos = short_position();
        assert!(!pos.update_stop(106.0, StopUpdate::Breakeven));
        assert!(pos.update_stop(100.0, StopUpdate::Breakeven));
        assert_eq!(pos.stop_loss(), 100.0);
    }

    #[test]
    fn scale_in_may_widen() {
        let mut pos = short_position();
        assert!(pos.update_stop(115.5, StopUpdate::ScaleIn));
        assert_eq!(pos.stop_loss(), 115.5);
    }

    #[test]
    fn stop_update_rejects_nan() {
        let mut pos = long_position();
        assert!(!pos.update_stop(f64::NAN, StopUpdate::ScaleIn));
        assert_eq!(pos.stop_loss(), 95.0);
    }

    #[test]
    fn reduce_realizes_pnl_and_counts_partials() {
        let mut pos = long_position();
        let pnl = pos.reduce(1.0, 110.0, 0.1);
        assert!((pnl - 10.0).abs() < 1e-10);
        assert_eq!(pos.partial_exits(), 1);
        assert!(!pos.is_closed());

        let pnl = pos.reduce(5.0, 120.0, 0.1);
        assert!((pnl - 20.0).abs() < 1e-10, "reduce is capped at remaining");
        assert!(pos.is_closed());
        assert_eq!(pos.partial_exits(), 1);

        let trade = pos.into_trade(4, ts(4), ExitReason::TakeProfit);
        assert!((trade.pnl_dollars - 29.8).abs() < 1e-10);
        assert!((trade.exit_price - 115.0).abs() < 1e-10);
        assert_eq!(trade.bars_held, 4);
        assert!((trade.pnl_pct - 29.8 / 200.0 * 100.0).abs() < 1e-10);
    }

    #[test]
    fn short_pnl_sign() {
        let mut pos = short_position();
        assert!((pos.unrealized_pnl(95.0) - 5.0).abs() < 1e-10);
        let pnl = pos.reduce(1.0, 104.0, 0.0);
        assert!((pnl + 4.0).abs() < 1e-10);
    }

    #[test]
    fn stop_hit_uses_adverse_extreme() {
        let pos = long_position();
        assert!(pos.is_stop_hit(&candle(100.0, 101.0, 94.0, 99.0)));
        assert!(!pos.is_stop_hit(&candle(100.0, 101.0, 96.0, 99.0)));

        let pos = short_position();
        assert!(pos.is_stop_hit(&candle(100.0, 105.0, 99.0, 100.0)));
    }

    #[test]
    fn stop_fills_at_open_on_gap() {
        let pos = long_position();
        assert_eq!(pos.stop_fill_price(&candle(92.0, 93.0, 90.0, 91.0)), 92.0);
        assert_eq!(pos.stop_fill_price(&candle(97.0, 98.0, 94.0, 96.0)), 95.0);

        let pos = short_position();
        assert_eq!(pos.stop_fill_price(&candle(108.0, 109.0, 107.0, 108.0)), 108.0);
    }

    #[test]
    fn target_hit_uses_favorable_extreme() {
        let pos = short_position();
        let level = &pos.targets()[0];
        assert!(pos.is_target_hit(level, &candle(95.0, 96.0, 89.0, 92.0)));
        assert!(!pos.is_target_hit(level, &candle(95.0, 96.0, 91.0, 92.0)));
    }

    #[test]
    fn replace_pending_keeps_hit_levels() {
        let mut pos = long_position();
        pos.mark_target_hit(0);
        pos.replace_pending_targets(vec![TargetLevel::new(100.0, 1.0)]);
        let prices: Vec<f64> = pos.targets().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![110.0, 100.0]);
    }

    #[test]
    fn best_price_tracks_favorable_side() {
        let mut pos = short_position();
        pos.record_extreme(&candle(99.0, 101.0, 96.0, 97.0));
        pos.record_extreme(&candle(97.0, 99.0, 98.0, 98.0));
        assert_eq!(pos.best_price(), 96.0);
    }

    #[test]
    fn scale_in_after_partial_blends_with_open_size_only() {
        let mut pos = long_position();
        assert!((pos.reduce(1.0, 110.0, 0.0) - 10.0).abs() < 1e-10);
        pos.add_fill(fill(2, 90.0, 1.0));
        // one unit left at 100 plus one new unit at 90
        assert!((pos.average_entry() - 95.0).abs() < 1e-10);
        assert!((pos.mean_fill_price() - 290.0 / 3.0).abs() < 1e-10);

        assert!(pos.reduce(2.0, 95.0, 0.0).abs() < 1e-10);
        let trade = pos.into_trade(3, ts(3), ExitReason::TimeExit);
        // sold 110 + 190, bought 200 + 90
        assert!((trade.pnl_dollars - 10.0).abs() < 1e-10);
        assert!((trade.average_entry - 290.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn reduce_leaves_cost_basis_unchanged() {
        let mut pos = short_position();
        pos.add_fill(fill(1, 110.0, 1.0));
        pos.reduce(0.5, 100.0, 0.0);
        assert!((pos.average_entry() - 105.0).abs() < 1e-10);
        assert!((pos.unrealized_pnl(95.0) - 1.5 * 10.0).abs() < 1e-10);
    }

    #[test]
    fn exit_reason_display() {
        assert_eq!(ExitReason::StopLoss.to_string(), "STOP_LOSS");
        assert_eq!(ExitReason::OppositeSignal.to_string(), "OPPOSITE_SIGNAL");
    }
}
