//! The venue-agnostic account interface the orchestration core depends on.
//!
//! Each trading account on the venue is represented by one `AccountClient`.
//! Concrete implementations (REST clients with signing, pagination and
//! response parsing) live outside this crate; the core never touches
//! venue-specific fields.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::types::{Order, OrderSide, OrderStatus, Position, Quote, TimeInForce};

/// Capability set of a single brokerage account.
///
/// All methods are fallible venue calls. Implementations are expected to
/// handle their own retries for transient network errors; the core treats a
/// returned error as either transient (monitoring) or cycle-fatal
/// (open/close paths).
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Human-readable account name used in logs and allocations.
    fn name(&self) -> &str;

    /// Current account equity in USD.
    async fn balance(&self) -> anyhow::Result<Decimal>;

    /// Open positions, optionally filtered to one market.
    async fn positions(&self, market: Option<&str>) -> anyhow::Result<Vec<Position>>;

    /// Resting orders, optionally filtered by status and market.
    async fn orders(
        &self,
        status: Option<OrderStatus>,
        market: Option<&str>,
    ) -> anyhow::Result<Vec<Order>>;

    /// Set leverage for a market. Implementations may skip the venue call
    /// when the leverage is already at the requested value.
    async fn set_leverage(&self, market: &str, leverage: u8) -> anyhow::Result<()>;

    /// Top-of-book quote with the instrument tick size.
    async fn get_quote(&self, market: &str) -> anyhow::Result<Quote>;

    /// Submit a market order; returns the venue order id.
    async fn market_order(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> anyhow::Result<i64>;

    /// Submit a limit order. `price: None` rests at the current best price
    /// for the side.
    async fn limit_order(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        price: Option<Decimal>,
        reduce_only: bool,
        tif: TimeInForce,
    ) -> anyhow::Result<i64>;

    /// Cancel a resting order.
    async fn cancel_order(&self, order_id: i64) -> anyhow::Result<()>;

    /// Latest snapshot of an order placed earlier.
    async fn get_order(&self, order_id: i64) -> anyhow::Result<Order>;
}
