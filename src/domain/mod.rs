//! Core domain types and logic: candles, indicators, signal rules,
//! position bookkeeping and the bar-by-bar execution simulator.

pub mod backtest;
pub mod candle;
pub mod config_validation;
pub mod cost;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod policy;
pub mod position;
pub mod signal;
pub mod simulator;
pub mod strategy;
pub mod sweep;
