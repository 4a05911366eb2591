//! Fee and slippage model.
//!
//! Both rates are percentages. Slippage always moves the price against the
//! trader: buys fill higher, sells fill lower. Fees are charged on the
//! notional of every fill.

use crate::domain::signal::Direction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub fee_pct: f64,
    pub slippage_pct: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            fee_pct: 0.05,
            slippage_pct: 0.02,
        }
    }
}

impl CostModel {
    pub const ZERO: CostModel = CostModel {
        fee_pct: 0.0,
        slippage_pct: 0.0,
    };

    /// Fee on a fill: notional * fee_pct / 100.
    pub fn fee(&self, notional: f64) -> f64 {
        notional.abs() * self.fee_pct / 100.0
    }

    /// Market price adjusted for slippage when opening in `direction`.
    ///
    /// Long entry (buy): price * (1 + slippage_pct / 100)
    /// Short entry (sell): price * (1 - slippage_pct / 100)
    pub fn entry_price(&self, market_price: f64, direction: Direction) -> f64 {
        market_price * (1.0 + direction.sign() * self.slippage_pct / 100.0)
    }

    /// Market price adjusted for slippage when closing a `direction` position.
    ///
    /// Long exit (sell): price * (1 - slippage_pct / 100)
    /// Short exit (buy to cover): price * (1 + slippage_pct / 100)
    pub fn exit_price(&self, market_price: f64, direction: Direction) -> f64 {
        market_price * (1.0 - direction.sign() * self.slippage_pct / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs(fee_pct: f64, slippage_pct: f64) -> CostModel {
        CostModel {
            fee_pct,
            slippage_pct,
        }
    }

    #[test]
    fn fee_is_percentage_of_notional() {
        let model = costs(0.1, 0.0);
        assert!((model.fee(10_000.0) - 10.0).abs() < 1e-10);
    }

    #[test]
    fn fee_ignores_sign_of_notional() {
        let model = costs(0.1, 0.0);
        assert!((model.fee(-10_000.0) - 10.0).abs() < 1e-10);
    }

    #[test]
    fn zero_model_is_free() {
        assert_eq!(CostModel::ZERO.fee(1_000_000.0), 0.0);
        assert_eq!(CostModel::ZERO.entry_price(100.0, Direction::Long), 100.0);
        assert_eq!(CostModel::ZERO.exit_price(100.0, Direction::Short), 100.0);
    }

    #[test]
    fn long_entry_pays_up() {
        let price = costs(0.0, 0.5).entry_price(100.0, Direction::Long);
        assert!((price - 100.5).abs() < 1e-10);
    }

    #[test]
    fn short_entry_sells_lower() {
        let price = costs(0.0, 0.5).entry_price(100.0, Direction::Short);
        assert!((price - 99.5).abs() < 1e-10);
    }

    #[test]
    fn long_exit_sells_lower() {
        let price = costs(0.0, 1.0).exit_price(200.0, Direction::Long);
        assert!((price - 198.0).abs() < 1e-10);
    }

    #[test]
    fn short_exit_buys_higher() {
        let price = costs(0.0, 1.0).exit_price(200.0, Direction::Short);
        assert!((price - 202.0).abs() < 1e-10);
    }
}
