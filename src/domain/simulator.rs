//! Bar-by-bar execution state machine.
//!
//! ```text
//!   FLAT ──signal (market)──────────────▶ OPEN ◀──┐ scale in / scale out
//!    │                                     │  └───┘ / trail
//!    └─signal (limit)─▶ ENTERING ─touch──▶─┘
//!                         │ timeout          │ full close
//!                         ▼                  ▼
//!                        FLAT               FLAT  (Trade recorded)
//! ```
//!
//! Each bar performs at most one state transition. While OPEN the checks run
//! in a fixed order: stop on the adverse extreme, take-profit levels on the
//! favorable extreme, time exit, opposite-signal exit, then scaling and stop
//! maintenance. Checking the stop first is the conservative assumption when
//! a single bar touches both the stop and a target.
//!
//! Bars inside the indicator warm-up are a no-op apart from the equity
//! point every bar receives.

use std::fmt;

use tracing::debug;

use crate::domain::backtest::{BacktestConfig, BacktestResult, EquityPoint};
use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;
use crate::domain::indicator::{Column, IndicatorFrame};
use crate::domain::policy::{EntryMode, StopAnchor};
use crate::domain::position::{
    ExitReason, Fill, Position, StopUpdate, TargetLevel, Trade, SIZE_EPSILON,
};
use crate::domain::signal::{BarContext, Direction, Signal};
use crate::domain::strategy::Strategy;

/// A resting limit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub signal: Signal,
    pub limit_price: f64,
    pub placed_bar: usize,
    pub max_wait_bars: usize,
    pub atr: f64,
}

#[derive(Debug, Clone)]
pub enum EngineState {
    Flat,
    Entering(PendingOrder),
    Open(Position),
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Flat => "FLAT",
            EngineState::Entering(_) => "ENTERING",
            EngineState::Open(_) => "OPEN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    OrderPlaced {
        bar: usize,
        direction: Direction,
        limit_price: f64,
    },
    OrderCancelled {
        bar: usize,
    },
    Entered {
        bar: usize,
        direction: Direction,
        price: f64,
        size: f64,
    },
    ScaledIn {
        bar: usize,
        price: f64,
        size: f64,
        average_entry: f64,
    },
    PartialExit {
        bar: usize,
        price: f64,
        size: f64,
    },
    StopMoved {
        bar: usize,
        from: f64,
        to: f64,
        kind: StopUpdate,
    },
    Closed {
        bar: usize,
        reason: ExitReason,
        pnl: f64,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::OrderPlaced {
                bar,
                direction,
                limit_price,
            } => write!(f, "[{bar}] {direction} limit placed at {limit_price:.4}"),
            EngineEvent::OrderCancelled { bar } => write!(f, "[{bar}] limit cancelled"),
            EngineEvent::Entered {
                bar,
                direction,
                price,
                size,
            } => write!(f, "[{bar}] entered {direction} {size:.6} @ {price:.4}"),
            EngineEvent::ScaledIn {
                bar,
                price,
                size,
                average_entry,
            } => write!(
                f,
                "[{bar}] scaled in {size:.6} @ {price:.4}, average {average_entry:.4}"
            ),
            EngineEvent::PartialExit { bar, price, size } => {
                write!(f, "[{bar}] partial exit {size:.6} @ {price:.4}")
            }
            EngineEvent::StopMoved { bar, from, to, kind } => {
                write!(f, "[{bar}] stop {from:.4} -> {to:.4} ({kind})")
            }
            EngineEvent::Closed { bar, reason, pnl } => {
                write!(f, "[{bar}] closed {reason}, pnl {pnl:.2}")
            }
        }
    }
}

pub struct ExecutionSimulator<'a> {
    candles: &'a [Candle],
    frame: &'a IndicatorFrame,
    strategy: &'a Strategy,
    config: &'a BacktestConfig,
    state: EngineState,
    capital: f64,
    peak_equity: f64,
    next_bar: usize,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    events: Vec<EngineEvent>,
}

impl<'a> ExecutionSimulator<'a> {
    pub fn new(
        candles: &'a [Candle],
        frame: &'a IndicatorFrame,
        strategy: &'a Strategy,
        config: &'a BacktestConfig,
    ) -> Result<Self, BarsimError> {
        if frame.len() != candles.len() {
            return Err(BarsimError::DataParse {
                reason: format!(
                    "indicator frame has {} rows for {} candles",
                    frame.len(),
                    candles.len()
                ),
            });
        }
        Ok(ExecutionSimulator {
            candles,
            frame,
            strategy,
            config,
            state: EngineState::Flat,
            capital: config.initial_capital,
            peak_equity: config.initial_capital,
            next_bar: 0,
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(candles.len()),
            events: Vec::new(),
        })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.next_bar >= self.candles.len()
    }

    /// Processes the next bar and returns its index, or `None` when every
    /// bar has been consumed.
    pub fn step(&mut self) -> Option<usize> {
        let bar = self.next_bar;
        let candles = self.candles;
        let frame = self.frame;
        let candle = candles.get(bar)?;

        if frame.is_warm(bar) {
            let ctx = BarContext::new(candles, frame, bar);
            let state = std::mem::replace(&mut self.state, EngineState::Flat);
            self.state = match state {
                EngineState::Flat => self.on_flat(&ctx),
                EngineState::Entering(order) => self.on_entering(order, &ctx),
                EngineState::Open(position) => self.on_open(position, &ctx),
            };
        }

        self.record_equity(candle);
        self.next_bar += 1;
        Some(bar)
    }

    pub fn run(mut self) -> BacktestResult {
        while self.step().is_some() {}
        self.into_result()
    }

    pub fn into_result(self) -> BacktestResult {
        let open_position = match self.state {
            EngineState::Open(position) => Some(position),
            EngineState::Entering(order) => {
                debug!(placed_bar = order.placed_bar, "pending order dropped at end of data");
                None
            }
            EngineState::Flat => None,
        };
        BacktestResult {
            initial_capital: self.config.initial_capital,
            final_capital: self.capital,
            trades: self.trades,
            equity_curve: self.equity_curve,
            events: self.events,
            open_position,
        }
    }

    fn on_flat(&mut self, ctx: &BarContext<'_>) -> EngineState {
        let Some(signal) = self.strategy.rules.evaluate(ctx) else {
            return EngineState::Flat;
        };
        let bar = ctx.index();
        let candle = ctx.candle();
        let atr = ctx.value(Column::Atr);

        let entry = self.strategy.entry;
        match entry {
            EntryMode::Market => {
                let price = self.config.costs.entry_price(candle.close, signal.direction);
                self.open_position(signal, price, atr, candle, bar)
            }
            EntryMode::Limit {
                offset_pct,
                max_wait_bars,
            } => {
                let limit_price =
                    candle.close * (1.0 - signal.direction.sign() * offset_pct / 100.0);
                debug!(bar, direction = %signal.direction, limit_price, rule = %signal.rule, "limit order placed");
                self.events.push(EngineEvent::OrderPlaced {
                    bar,
                    direction: signal.direction,
                    limit_price,
                });
                EngineState::Entering(PendingOrder {
                    signal,
                    limit_price,
                    placed_bar: bar,
                    max_wait_bars,
                    atr,
                })
            }
        }
    }

    fn on_entering(&mut self, order: PendingOrder, ctx: &BarContext<'_>) -> EngineState {
        let bar = ctx.index();
        let candle = ctx.candle();
        let limit = order.limit_price;

        let touched = match order.signal.direction {
            Direction::Long => candle.low <= limit,
            Direction::Short => candle.high >= limit,
        };
        if touched {
            let price = match order.signal.direction {
                Direction::Long if candle.open < limit => candle.open,
                Direction::Short if candle.open > limit => candle.open,
                _ => limit,
            };
            return self.open_position(order.signal, price, order.atr, candle, bar);
        }

        if bar - order.placed_bar >= order.max_wait_bars {
            debug!(bar, placed_bar = order.placed_bar, "limit order cancelled");
            self.events.push(EngineEvent::OrderCancelled { bar });
            return EngineState::Flat;
        }
        EngineState::Entering(order)
    }

    fn target_levels(&self, reference: f64, atr: f64, signal: &Signal) -> Vec<TargetLevel> {
        let sign = signal.direction.sign();
        self.strategy
            .exit
            .targets
            .iter()
            .filter_map(|target| {
                let distance =
                    target.distance
                        .resolve(reference, atr, signal.suggested_target_distance);
                (distance > 0.0).then(|| TargetLevel::new(reference + sign * distance, target.fraction))
            })
            .collect()
    }

    fn open_position(
        &mut self,
        signal: Signal,
        price: f64,
        atr: f64,
        candle: &Candle,
        bar: usize,
    ) -> EngineState {
        let direction = signal.direction;
        let stop_distance = self
            .strategy
            .exit
            .stop
            .resolve(price, atr, signal.suggested_stop_distance);
        if !(stop_distance > 0.0) {
            debug!(bar, stop_distance, "entry skipped: no usable stop distance");
            return EngineState::Flat;
        }

        let allocation = self.strategy.scaling.allocation(0);
        let size = self.strategy.sizing.size(
            self.capital,
            price,
            stop_distance,
            allocation,
            self.config.leverage,
        );
        let notional = size * price;
        if self.capital < self.config.min_notional
            || notional < self.config.min_notional
            || size <= 0.0
        {
            debug!(bar, capital = self.capital, notional, "entry skipped: below minimum notional");
            return EngineState::Flat;
        }

        let fee = self.config.costs.fee(notional);
        self.capital -= fee;

        let stop_loss = price - direction.sign() * stop_distance;
        let targets = self.target_levels(price, atr, &signal);
        let fill = Fill {
            bar,
            timestamp: candle.timestamp,
            price,
            size,
            fee,
        };

        debug!(bar, direction = %direction, price, size, stop_loss, rule = %signal.rule, "position opened");
        self.events.push(EngineEvent::Entered {
            bar,
            direction,
            price,
            size,
        });

        let mut position = Position::open(signal, fill, stop_loss, targets, atr);
        position.committed_risk_pct = self.strategy.sizing.fill_risk_pct(allocation);
        EngineState::Open(position)
    }

    fn on_open(&mut self, mut position: Position, ctx: &BarContext<'_>) -> EngineState {
        let bar = ctx.index();
        let candle = ctx.candle();
        let direction = position.direction;
        let costs = self.config.costs;
        let strategy = self.strategy;
        let exit = &strategy.exit;

        if position.is_stop_hit(candle) {
            let price = costs.exit_price(position.stop_fill_price(candle), direction);
            return self.close(position, price, bar, candle, ExitReason::StopLoss);
        }

        let filled = position.filled_size();
        for index in 0..position.targets().len() {
            let level = position.targets()[index].clone();
            if level.hit || !position.is_target_hit(&level, candle) {
                continue;
            }
            position.mark_target_hit(index);

            let size = (level.fraction * filled).min(position.remaining_size());
            if size <= SIZE_EPSILON {
                continue;
            }
            let fee = costs.fee(size * level.price);
            let pnl = position.reduce(size, level.price, fee);
            self.capital += pnl - fee;

            if position.is_closed() {
                return self.finish(position, bar, candle, ExitReason::TakeProfit);
            }
            debug!(bar, price = level.price, size, "partial exit");
            self.events.push(EngineEvent::PartialExit {
                bar,
                price: level.price,
                size,
            });
        }

        if let Some(max_hold) = exit.max_hold_bars {
            if position.bars_held(bar) >= max_hold {
                let price = costs.exit_price(candle.close, direction);
                return self.close(position, price, bar, candle, ExitReason::TimeExit);
            }
        }

        if exit.exit_on_opposite_signal {
            let reversed = strategy
                .rules
                .evaluate(ctx)
                .is_some_and(|signal| signal.direction == direction.opposite());
            if reversed {
                let price = costs.exit_price(candle.close, direction);
                return self.close(position, price, bar, candle, ExitReason::OppositeSignal);
            }
        }

        if strategy.scaling.enabled() && position.fill_count() < strategy.scaling.max_fills {
            self.try_scale_in(&mut position, candle, bar);
        }

        if let Some(partials) = exit.breakeven_after_partials {
            if position.partial_exits() >= partials {
                let breakeven = position.average_entry();
                self.move_stop(&mut position, breakeven, StopUpdate::Breakeven, bar);
            }
        }

        position.record_extreme(candle);
        if let Some(trail) = exit.trailing {
            let best = position.best_price();
            let distance = trail.resolve(
                best,
                position.entry_atr,
                position.signal.suggested_stop_distance,
            );
            if distance > 0.0 {
                let level = best - direction.sign() * distance;
                self.move_stop(&mut position, level, StopUpdate::Trail, bar);
            }
        }

        EngineState::Open(position)
    }

    fn try_scale_in(&mut self, position: &mut Position, candle: &Candle, bar: usize) {
        let direction = position.direction;
        let sign = direction.sign();
        let atr = position.entry_atr;
        let signal_stop = position.signal.suggested_stop_distance;
        let strategy = self.strategy;
        let scaling = &strategy.scaling;

        let latest = position.latest_fill().price;
        let step = scaling.step.resolve(latest, atr, signal_stop);
        if !(step > 0.0) {
            return;
        }
        let level = latest - sign * step;
        let price = match direction {
            Direction::Long if candle.low > level => return,
            Direction::Short if candle.high < level => return,
            Direction::Long if candle.open < level => candle.open,
            Direction::Short if candle.open > level => candle.open,
            _ => level,
        };

        let allocation = scaling.allocation(position.fill_count());
        let sizing = strategy.sizing;
        if !sizing.allows_additional_risk(position.committed_risk_pct, allocation) {
            debug!(bar, committed = position.committed_risk_pct, "scale-in skipped: risk budget exhausted");
            return;
        }

        let stop_distance = strategy.exit.stop.resolve(price, atr, signal_stop);
        let open_notional = position.remaining_size() * position.average_entry();
        let headroom = (self.capital * self.config.leverage - open_notional).max(0.0);
        let size = sizing
            .size(self.capital, price, stop_distance, allocation, self.config.leverage)
            .min(headroom / price);
        let notional = size * price;
        if notional < self.config.min_notional || size <= 0.0 {
            debug!(bar, notional, "scale-in skipped: below minimum notional");
            return;
        }

        let fee = self.config.costs.fee(notional);
        self.capital -= fee;
        position.add_fill(Fill {
            bar,
            timestamp: candle.timestamp,
            price,
            size,
            fee,
        });
        position.committed_risk_pct += sizing.fill_risk_pct(allocation);

        let average = position.average_entry();
        debug!(bar, price, size, average_entry = average, fills = position.fill_count(), "scaled in");
        self.events.push(EngineEvent::ScaledIn {
            bar,
            price,
            size,
            average_entry: average,
        });

        let anchor = match scaling.stop_anchor {
            StopAnchor::Latest => price,
            StopAnchor::Average => average,
        };
        let stop = anchor - sign * strategy.exit.stop.resolve(anchor, atr, signal_stop);
        self.move_stop(position, stop, StopUpdate::ScaleIn, bar);

        let breakeven_target = scaling
            .breakeven_target_after_fills
            .is_some_and(|fills| position.fill_count() >= fills);
        if breakeven_target {
            position.replace_pending_targets(vec![TargetLevel::new(average, 1.0)]);
        } else {
            let hit = position.targets().iter().filter(|t| t.hit).count();
            let levels = self
                .target_levels(average, atr, &position.signal)
                .into_iter()
                .skip(hit)
                .collect();
            position.replace_pending_targets(levels);
        }
    }

    fn move_stop(&mut self, position: &mut Position, price: f64, kind: StopUpdate, bar: usize) {
        let from = position.stop_loss();
        if position.update_stop(price, kind) {
            debug!(bar, from, to = price, kind = %kind, "stop moved");
            self.events.push(EngineEvent::StopMoved {
                bar,
                from,
                to: price,
                kind,
            });
        }
    }

    fn close(
        &mut self,
        mut position: Position,
        price: f64,
        bar: usize,
        candle: &Candle,
        reason: ExitReason,
    ) -> EngineState {
        let size = position.remaining_size();
        let fee = self.config.costs.fee(size * price);
        let pnl = position.reduce(size, price, fee);
        self.capital += pnl - fee;
        self.finish(position, bar, candle, reason)
    }

    fn finish(
        &mut self,
        position: Position,
        bar: usize,
        candle: &Candle,
        reason: ExitReason,
    ) -> EngineState {
        let trade = position.into_trade(bar, candle.timestamp, reason);
        debug!(
            bar,
            reason = %reason,
            pnl = trade.pnl_dollars,
            bars_held = trade.bars_held,
            capital = self.capital,
            "position closed"
        );
        self.events.push(EngineEvent::Closed {
            bar,
            reason,
            pnl: trade.pnl_dollars,
        });
        self.trades.push(trade);
        EngineState::Flat
    }

    fn record_equity(&mut self, candle: &Candle) {
        let open_pnl = match &self.state {
            EngineState::Open(position) => position.unrealized_pnl(candle.close),
            _ => 0.0,
        };
        let equity = self.capital + open_pnl;
        self.peak_equity = self.peak_equity.max(equity);
        let drawdown_pct = if self.peak_equity > 0.0 {
            (equity - self.peak_equity) / self.peak_equity * 100.0
        } else {
            0.0
        };
        self.equity_curve.push(EquityPoint {
            timestamp: candle.timestamp,
            equity,
            drawdown_pct,
        });
    }
}
