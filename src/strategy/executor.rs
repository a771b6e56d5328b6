//! Order placement and the adaptive limit-order fill wait.
//!
//! The fill wait is a small state machine: poll the order, finish on any
//! terminal status, time out relative to the first partial fill, and
//! periodically chase the best bid/offer with the unfilled remainder. No
//! exit path leaves a resting order behind.

use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::exchange::{AccountClient, OrderSide, OrderStatus, TimeInForce};

/// Timing and fallback knobs for the limit fill wait.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Order status poll cadence.
    pub poll_interval: Duration,
    /// Timeout measured from the first observed partial fill. An order with
    /// zero fills keeps waiting (and repricing) indefinitely.
    pub fill_timeout: Duration,
    /// Cadence for chasing the best bid/offer.
    pub reprice_interval: Duration,
    /// Submit a market order for the remainder when the fill wait times out.
    pub market_fallback: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            fill_timeout: Duration::from_secs(60),
            reprice_interval: Duration::from_secs(20),
            market_fallback: true,
        }
    }
}

/// Terminal outcome of a limit fill wait. Expected non-fill conditions are
/// values, not errors; only venue failures surface as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOutcome {
    /// The limit order filled completely.
    Filled,
    /// Timed out after a partial fill; the remainder was market-ordered.
    FallbackFilled,
    /// The venue cancelled the order.
    Cancelled,
    /// The venue rejected the order.
    Rejected,
    /// Timed out with market fallback disabled; the order was cancelled.
    TimedOut,
}

impl LimitOutcome {
    /// Whether the full intended amount ended up executed.
    pub fn is_filled(self) -> bool {
        matches!(self, LimitOutcome::Filled | LimitOutcome::FallbackFilled)
    }
}

/// Places orders for one leg of a cycle.
pub struct OrderExecutor {
    config: ExecutorConfig,
}

impl OrderExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Fire-and-confirm market order.
    pub async fn market_open(
        &self,
        client: &dyn AccountClient,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> Result<i64> {
        debug!(account = client.name(), %market, %side, %amount, reduce_only, "Market order");
        client.market_order(market, side, amount, reduce_only).await
    }

    /// Place a limit order at the best price for the side and wait for it to
    /// fill, repricing to the BBO while it rests.
    pub async fn limit_open_and_wait(
        &self,
        client: &dyn AccountClient,
        market: &str,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> Result<LimitOutcome> {
        let quote = client.get_quote(market).await?;
        let price = quote.best(side);
        debug!(account = client.name(), %market, %side, %amount, %price, "Limit order");

        let mut order_id = client
            .limit_order(market, side, amount, Some(price), reduce_only, TimeInForce::Gtc)
            .await?;

        match self
            .wait_filled(client, market, side, reduce_only, &mut order_id)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // A venue error mid-wait must not leak the resting order.
                if let Err(cancel_err) = client.cancel_order(order_id).await {
                    warn!(
                        account = client.name(),
                        order_id,
                        error = %cancel_err,
                        "Cancel after failed fill wait also failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn wait_filled(
        &self,
        client: &dyn AccountClient,
        market: &str,
        side: OrderSide,
        reduce_only: bool,
        order_id: &mut i64,
    ) -> Result<LimitOutcome> {
        let started_at = Instant::now();
        let mut reprice_at = Instant::now();
        let mut filled_since: Option<Instant> = None;
        let mut last_price: Option<Decimal> = None;

        loop {
            sleep(self.config.poll_interval).await;
            let order = client.get_order(*order_id).await?;

            match order.status {
                OrderStatus::Filled => {
                    info!(
                        account = client.name(),
                        elapsed_secs = started_at.elapsed().as_secs_f64(),
                        "Limit order filled"
                    );
                    return Ok(LimitOutcome::Filled);
                }
                OrderStatus::Cancelled => {
                    info!(account = client.name(), "Limit order cancelled by venue");
                    return Ok(LimitOutcome::Cancelled);
                }
                OrderStatus::Rejected => {
                    info!(account = client.name(), "Limit order rejected");
                    return Ok(LimitOutcome::Rejected);
                }
                OrderStatus::Open | OrderStatus::PartiallyFilled => {}
            }

            // The fill timeout counts from the first partial fill.
            if order.filled_amount > Decimal::ZERO && filled_since.is_none() {
                filled_since = Some(Instant::now());
            }

            if let Some(since) = filled_since {
                if since.elapsed() >= self.config.fill_timeout {
                    debug!(
                        account = client.name(),
                        timeout_secs = self.config.fill_timeout.as_secs_f64(),
                        "Partial fill timeout"
                    );
                    client.cancel_order(*order_id).await?;

                    if self.config.market_fallback {
                        let remaining = order.remaining();
                        debug!(account = client.name(), %remaining, "Market fallback for remainder");
                        client.market_order(market, side, remaining, reduce_only).await?;
                        return Ok(LimitOutcome::FallbackFilled);
                    }
                    return Ok(LimitOutcome::TimedOut);
                }
            }

            // Chase the BBO when the reprice interval elapses.
            if reprice_at.elapsed() >= self.config.reprice_interval {
                let prev = last_price.unwrap_or(order.price);
                let quote = client.get_quote(market).await?;
                let best = quote.best(side);

                if best == prev {
                    // No churn when the book has not moved.
                    reprice_at = Instant::now();
                    last_price = Some(prev);
                    continue;
                }

                let remaining = order.remaining();
                client.cancel_order(*order_id).await?;
                debug!(account = client.name(), from = %prev, to = %best, "Repricing resting order");

                *order_id = client
                    .limit_order(market, side, remaining, Some(best), reduce_only, TimeInForce::Gtc)
                    .await?;
                reprice_at = Instant::now();
                last_price = Some(best);
            }
        }
    }
}
