//! In-memory venue simulation for paper trading and tests.
//!
//! Positions are opened and closed at the quoted mid price with no fees or
//! slippage. `get_order` can follow a pre-loaded script of order snapshots,
//! which is how executor tests drive the fill-wait state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::AccountClient;
use super::types::{Order, OrderSide, OrderStatus, Position, Quote, TimeInForce};

/// Venue call counters, for assertions in tests.
#[derive(Debug, Default, Clone)]
pub struct CallCounters {
    pub balance_reads: u64,
    pub market_orders: u64,
    pub limit_orders: u64,
    pub cancels: u64,
    pub leverage_updates: u64,
}

#[derive(Debug, Default)]
struct MockState {
    balance: Decimal,
    leverage: HashMap<String, u8>,
    quotes: HashMap<String, Quote>,
    positions: Vec<Position>,
    /// All orders ever placed, by id, with their latest simulated status.
    orders: HashMap<i64, Order>,
    /// Ids of orders currently resting on the book.
    resting: Vec<i64>,
    /// Scripted `get_order` responses; when non-empty, limit orders rest
    /// instead of filling immediately and polls walk this script.
    order_script: Vec<Order>,
    script_pos: usize,
    /// Number of upcoming `get_quote` calls that should fail.
    quote_failures: u32,
    /// Fixed latency added to every `get_quote` call.
    quote_delay: Option<Duration>,
    last_market_order: Option<(String, OrderSide, Decimal, bool)>,
    calls: CallCounters,
}

/// Simulated single-account venue client.
pub struct MockAccountClient {
    name: String,
    state: Arc<RwLock<MockState>>,
    order_seq: AtomicI64,
}

impl MockAccountClient {
    pub fn new(name: impl Into<String>, balance: Decimal) -> Self {
        let state = MockState {
            balance,
            ..MockState::default()
        };
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(state)),
            order_seq: AtomicI64::new(1),
        }
    }

    pub async fn set_quote(&self, market: &str, bid: Decimal, ask: Decimal, tick: Decimal) {
        self.state
            .write()
            .await
            .quotes
            .insert(market.to_string(), Quote { bid, ask, tick });
    }

    pub async fn set_balance(&self, balance: Decimal) {
        self.state.write().await.balance = balance;
    }

    pub async fn push_position(&self, position: Position) {
        self.state.write().await.positions.push(position);
    }

    /// Pre-load the `get_order` script. The last entry repeats once the
    /// script is exhausted.
    pub async fn script_orders(&self, orders: Vec<Order>) {
        let mut state = self.state.write().await;
        state.order_script = orders;
        state.script_pos = 0;
    }

    pub async fn fail_next_quotes(&self, count: u32) {
        self.state.write().await.quote_failures = count;
    }

    /// Add a fixed latency to every subsequent `get_quote` call.
    pub async fn set_quote_delay(&self, delay: Duration) {
        self.state.write().await.quote_delay = Some(delay);
    }

    pub async fn counters(&self) -> CallCounters {
        self.state.read().await.calls.clone()
    }

    pub async fn last_market_order(&self) -> Option<(String, OrderSide, Decimal, bool)> {
        self.state.read().await.last_market_order.clone()
    }

    fn next_order_id(&self) -> i64 {
        self.order_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply a fill to the simulated position book.
    fn apply_fill(
        state: &mut MockState,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        reduce_only: bool,
    ) {
        if reduce_only {
            let mut remaining = amount;
            state.positions.retain_mut(|pos| {
                if pos.symbol != market || remaining == Decimal::ZERO {
                    return true;
                }
                let closed = pos.amount.min(remaining);
                pos.amount -= closed;
                remaining -= closed;
                pos.amount > Decimal::ZERO
            });
        } else {
            state.positions.push(Position {
                symbol: market.to_string(),
                side,
                amount,
                entry_price: price,
            });
        }
    }
}

#[async_trait]
impl AccountClient for MockAccountClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn balance(&self) -> Result<Decimal> {
        let mut state = self.state.write().await;
        state.calls.balance_reads += 1;
        Ok(state.balance)
    }

    async fn positions(&self, market: Option<&str>) -> Result<Vec<Position>> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .iter()
            .filter(|p| market.map_or(true, |m| p.symbol == m))
            .cloned()
            .collect())
    }

    async fn orders(
        &self,
        status: Option<OrderStatus>,
        market: Option<&str>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .resting
            .iter()
            .filter_map(|id| state.orders.get(id))
            .filter(|o| status.map_or(true, |s| o.status == s))
            .filter(|o| market.map_or(true, |m| o.symbol == m))
            .cloned()
            .collect())
    }

    async fn set_leverage(&self, market: &str, leverage: u8) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.leverage_updates += 1;
        state.leverage.insert(market.to_string(), leverage);
        Ok(())
    }

    async fn get_quote(&self, market: &str) -> Result<Quote> {
        let delay = self.state.read().await.quote_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.quote_failures > 0 {
            state.quote_failures -= 1;
            bail!("quote temporarily unavailable for {market}");
        }
        match state.quotes.get(market) {
            Some(quote) => Ok(*quote),
            None => bail!("unknown market: {market}"),
        }
    }

    async fn market_order(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> Result<i64> {
        let id = self.next_order_id();
        let mut state = self.state.write().await;
        state.calls.market_orders += 1;
        state.last_market_order = Some((market.to_string(), side, amount, reduce_only));

        let price = match state.quotes.get(market) {
            Some(quote) => quote.mid(),
            None if reduce_only => state
                .positions
                .iter()
                .find(|p| p.symbol == market)
                .map(|p| p.entry_price)
                .unwrap_or(Decimal::ZERO),
            None => bail!("unknown market: {market}"),
        };

        Self::apply_fill(&mut state, market, side, amount, price, reduce_only);
        state.orders.insert(
            id,
            Order {
                id,
                symbol: market.to_string(),
                side,
                price,
                initial_amount: amount,
                filled_amount: amount,
                status: OrderStatus::Filled,
            },
        );
        debug!(account = %self.name, %market, %side, %amount, reduce_only, "Mock market order filled");
        Ok(id)
    }

    async fn limit_order(
        &self,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        price: Option<Decimal>,
        reduce_only: bool,
        _tif: TimeInForce,
    ) -> Result<i64> {
        let id = self.next_order_id();
        let mut state = self.state.write().await;
        state.calls.limit_orders += 1;

        let price = match (price, state.quotes.get(market)) {
            (Some(p), _) => p,
            (None, Some(quote)) => quote.best(side),
            (None, None) => bail!("unknown market: {market}"),
        };

        if state.order_script.is_empty() {
            // Without a script, limit orders fill immediately at their price.
            Self::apply_fill(&mut state, market, side, amount, price, reduce_only);
            state.orders.insert(
                id,
                Order {
                    id,
                    symbol: market.to_string(),
                    side,
                    price,
                    initial_amount: amount,
                    filled_amount: amount,
                    status: OrderStatus::Filled,
                },
            );
        } else {
            state.orders.insert(
                id,
                Order {
                    id,
                    symbol: market.to_string(),
                    side,
                    price,
                    initial_amount: amount,
                    filled_amount: Decimal::ZERO,
                    status: OrderStatus::Open,
                },
            );
            state.resting.push(id);
        }
        Ok(id)
    }

    async fn cancel_order(&self, order_id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.cancels += 1;
        state.resting.retain(|id| *id != order_id);
        if let Some(order) = state.orders.get_mut(&order_id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn get_order(&self, order_id: i64) -> Result<Order> {
        let mut state = self.state.write().await;
        if !state.order_script.is_empty() {
            let idx = state.script_pos.min(state.order_script.len() - 1);
            state.script_pos += 1;
            return Ok(state.order_script[idx].clone());
        }
        match state.orders.get(&order_id) {
            Some(order) => Ok(order.clone()),
            None => bail!("unknown order: {order_id}"),
        }
    }
}
