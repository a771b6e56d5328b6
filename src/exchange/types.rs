//! Venue data types shared across the orchestration layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side in venue terms: `Bid` buys (long), `Ask` sells (short).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Bid,
    Ask,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Bid => OrderSide::Ask,
            OrderSide::Ask => OrderSide::Bid,
        }
    }

    /// ROI sign adjustment: +1 for long positions, -1 for short.
    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Bid => Decimal::ONE,
            OrderSide::Ask => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Bid => write!(f, "bid"),
            OrderSide::Ask => write!(f, "ask"),
        }
    }
}

/// Order lifecycle status. The venue owns the authoritative state; the
/// executor only polls snapshots of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// A terminal order can never fill further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// Snapshot of an order as reported by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub initial_amount: Decimal,
    pub filled_amount: Decimal,
    pub status: OrderStatus,
}

impl Order {
    /// Unfilled remainder of the original amount.
    pub fn remaining(&self) -> Decimal {
        self.initial_amount - self.filled_amount
    }
}

/// Open position snapshot. `amount` is always positive; direction is `side`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: Decimal,
    pub entry_price: Decimal,
}

impl Position {
    pub fn entry_notional(&self) -> Decimal {
        self.amount * self.entry_price
    }

    pub fn notional_at(&self, price: Decimal) -> Decimal {
        self.amount * price
    }
}

/// Top-of-book quote with the instrument lot/tick granularity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub tick: Decimal,
}

impl Quote {
    /// Best resting price for an order on the given side.
    pub fn best(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Bid => self.bid,
            OrderSide::Ask => self.ask,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// Per-account equity, read fresh at cycle boundaries and never cached.
#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub name: String,
    pub equity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite_and_sign() {
        assert_eq!(OrderSide::Bid.opposite(), OrderSide::Ask);
        assert_eq!(OrderSide::Ask.opposite(), OrderSide::Bid);
        assert_eq!(OrderSide::Bid.sign(), dec!(1));
        assert_eq!(OrderSide::Ask.sign(), dec!(-1));
    }

    #[test]
    fn test_order_remaining() {
        let order = Order {
            id: 1,
            symbol: "BTC".into(),
            side: OrderSide::Bid,
            price: dec!(50000),
            initial_amount: dec!(1.0),
            filled_amount: dec!(0.4),
            status: OrderStatus::PartiallyFilled,
        };
        assert_eq!(order.remaining(), dec!(0.6));
        assert!(!order.status.is_terminal());
    }

    #[test]
    fn test_quote_best_and_mid() {
        let quote = Quote {
            bid: dec!(99),
            ask: dec!(101),
            tick: dec!(0.01),
        };
        assert_eq!(quote.best(OrderSide::Bid), dec!(99));
        assert_eq!(quote.best(OrderSide::Ask), dec!(101));
        assert_eq!(quote.mid(), dec!(100));
    }
}
