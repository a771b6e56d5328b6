//! Position safety monitoring during the hold window.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::exchange::AccountClient;

/// Watches open positions for stop-loss breach and state drift.
pub struct PositionMonitor {
    pnl_limit: Decimal,
    heartbeat: Duration,
}

impl PositionMonitor {
    pub fn new(pnl_limit: Decimal, heartbeat: Duration) -> Self {
        Self {
            pnl_limit,
            heartbeat,
        }
    }

    /// One safety pass over all accounts. Returns `Ok(false)` when any
    /// account is unsafe: stop-loss breached, or a position count other than
    /// exactly one for the market (state drift). Venue errors bubble up so
    /// the hold loop can treat them as transient.
    pub async fn check(
        &self,
        accounts: &[Arc<dyn AccountClient>],
        market: &str,
    ) -> Result<bool> {
        for acc in accounts {
            let positions = acc.positions(Some(market)).await?;
            if positions.len() != 1 {
                warn!(
                    account = acc.name(),
                    market,
                    count = positions.len(),
                    "Unexpected position count, closing..."
                );
                return Ok(false);
            }

            let pos = &positions[0];
            let quote = acc.get_quote(market).await?;

            let entry_cost = pos.entry_notional();
            let current_cost = pos.notional_at(quote.mid());
            if entry_cost == Decimal::ZERO {
                warn!(account = acc.name(), market, "Zero entry notional, closing...");
                return Ok(false);
            }

            let roi = (current_cost / entry_cost - Decimal::ONE) * pos.side.sign();
            if roi.abs() >= self.pnl_limit {
                info!(
                    account = acc.name(),
                    market,
                    roi = %roi.round_dp(4),
                    entry = %entry_cost.round_dp(2),
                    current = %current_cost.round_dp(2),
                    "Position hit stop loss, closing..."
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Hold positions for `duration`, checking safety every heartbeat.
    ///
    /// Sleeps the smaller of the heartbeat and the remaining time, so the
    /// loop never overshoots the planned end. Returns `false` as soon as a
    /// check reports unsafe; transient check errors only log and the wait
    /// continues.
    pub async fn hold(
        &self,
        accounts: &[Arc<dyn AccountClient>],
        market: &str,
        duration: Duration,
    ) -> bool {
        let until = Instant::now() + duration;

        while Instant::now() < until {
            let remaining = until.saturating_duration_since(Instant::now());
            sleep(remaining.min(self.heartbeat)).await;

            match self.check(accounts, market).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(error = %e, "Position safety check failed, continuing wait...");
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockAccountClient, OrderSide, Position};
    use rust_decimal_macros::dec;

    fn long_position(entry_price: Decimal) -> Position {
        Position {
            symbol: "BTC".into(),
            side: OrderSide::Bid,
            amount: dec!(1),
            entry_price,
        }
    }

    async fn account_with_position(entry: Decimal, mid: Decimal) -> Arc<dyn AccountClient> {
        let client = MockAccountClient::new("a1", dec!(1000));
        client.set_quote("BTC", mid, mid, dec!(0.01)).await;
        client.push_position(long_position(entry)).await;
        Arc::new(client)
    }

    #[tokio::test]
    async fn test_unsafe_exactly_at_pnl_limit() {
        // Long from 100 quoted at 125: roi = +0.25, boundary inclusive.
        let accounts = vec![account_with_position(dec!(100), dec!(125)).await];
        let monitor = PositionMonitor::new(dec!(0.25), Duration::from_millis(10));

        assert!(!monitor.check(&accounts, "BTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_safe_just_below_pnl_limit() {
        let accounts = vec![account_with_position(dec!(100), dec!(124.9)).await];
        let monitor = PositionMonitor::new(dec!(0.25), Duration::from_millis(10));

        assert!(monitor.check(&accounts, "BTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_short_position_roi_sign_flipped() {
        // Short from 100 quoted at 80: roi = +0.20 for the short side.
        let client = MockAccountClient::new("a1", dec!(1000));
        client.set_quote("BTC", dec!(80), dec!(80), dec!(0.01)).await;
        client
            .push_position(Position {
                symbol: "BTC".into(),
                side: OrderSide::Ask,
                amount: dec!(1),
                entry_price: dec!(100),
            })
            .await;
        let accounts: Vec<Arc<dyn AccountClient>> = vec![Arc::new(client)];

        let monitor = PositionMonitor::new(dec!(0.15), Duration::from_millis(10));
        assert!(!monitor.check(&accounts, "BTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_position_count_is_unsafe() {
        let client = MockAccountClient::new("a1", dec!(1000));
        client.set_quote("BTC", dec!(100), dec!(100), dec!(0.01)).await;
        // No position at all on this market.
        let accounts: Vec<Arc<dyn AccountClient>> = vec![Arc::new(client)];

        let monitor = PositionMonitor::new(dec!(0.25), Duration::from_millis(10));
        assert!(!monitor.check(&accounts, "BTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_hold_survives_transient_check_errors() {
        let client = MockAccountClient::new("a1", dec!(1000));
        client.set_quote("BTC", dec!(100), dec!(100), dec!(0.01)).await;
        client.push_position(long_position(dec!(100))).await;
        client.fail_next_quotes(2).await;
        let mock = Arc::new(client);
        let accounts: Vec<Arc<dyn AccountClient>> = vec![mock];

        let monitor = PositionMonitor::new(dec!(0.25), Duration::from_millis(20));
        let safe = monitor
            .hold(&accounts, "BTC", Duration::from_millis(100))
            .await;

        assert!(safe);
    }

    #[tokio::test]
    async fn test_hold_exits_within_one_heartbeat_of_breach() {
        let client = Arc::new(MockAccountClient::new("a1", dec!(1000)));
        client.set_quote("BTC", dec!(100), dec!(100), dec!(0.01)).await;
        client.push_position(long_position(dec!(100))).await;
        let accounts: Vec<Arc<dyn AccountClient>> = vec![client.clone()];

        // Breach the stop loss at ~450ms into a 600ms hold.
        let breacher = client.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(450)).await;
            breacher.set_quote("BTC", dec!(130), dec!(130), dec!(0.01)).await;
        });

        let monitor = PositionMonitor::new(dec!(0.25), Duration::from_millis(200));
        let started = std::time::Instant::now();
        let safe = monitor
            .hold(&accounts, "BTC", Duration::from_millis(600))
            .await;
        let elapsed = started.elapsed();

        assert!(!safe);
        // Detected on the heartbeat after the breach, not at the full hold.
        assert!(elapsed >= Duration::from_millis(440), "elapsed = {elapsed:?}");
        assert!(elapsed < Duration::from_millis(700), "elapsed = {elapsed:?}");
    }
}
