//! Trade cycle orchestration and the supervisory loop.
//!
//! One cycle walks Idle → Sizing → Opening → Holding → Closing → Idle:
//! fresh balances feed the allocator, legs open across all accounts with
//! offsetting sides, the monitor guards the hold window, and every path out
//! of the cycle ends in a close. The supervisory loop force-closes all
//! accounts on any cycle error and backs off before restarting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::future::{join_all, try_join_all};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::exchange::{AccountBalance, AccountClient, OrderSide};
use crate::strategy::allocator::SizingAllocator;
use crate::strategy::executor::{ExecutorConfig, OrderExecutor};
use crate::strategy::monitor::PositionMonitor;
use crate::utils::{self, decimal::usd_to_qty};

/// Backoff before restarting the cycle loop after an escaped error.
const OUTER_BACKOFF: Duration = Duration::from_secs(180);

/// One account's leg of a cycle: immutable once the plan is built.
struct Act {
    acc: Arc<dyn AccountClient>,
    side: OrderSide,
    size_usd: Decimal,
    qty: Decimal,
}

/// Orchestrates trade cycles across 2-5 accounts.
pub struct CycleController {
    cfg: Config,
    accs: Vec<Arc<dyn AccountClient>>,
    allocator: SizingAllocator,
    executor: OrderExecutor,
    monitor: PositionMonitor,
    rng: StdRng,
    initial_bal: Decimal,
}

impl CycleController {
    pub fn new(cfg: Config, accs: Vec<Arc<dyn AccountClient>>, rng: StdRng) -> Self {
        let executor = OrderExecutor::new(ExecutorConfig {
            fill_timeout: Duration::from_secs(cfg.limit_wait),
            reprice_interval: Duration::from_secs(cfg.limit_reprice),
            market_fallback: cfg.limit_market_fallback,
            ..ExecutorConfig::default()
        });
        let monitor = PositionMonitor::new(
            cfg.pnl_limit,
            Duration::from_secs(cfg.trade_heartbeat),
        );

        Self {
            cfg,
            accs,
            allocator: SizingAllocator::default(),
            executor,
            monitor,
            rng,
            initial_bal: Decimal::ZERO,
        }
    }

    /// Fetch fresh balances for all accounts concurrently.
    async fn get_bals(accs: &[Arc<dyn AccountClient>]) -> Result<Vec<AccountBalance>> {
        try_join_all(accs.iter().map(|acc| async move {
            let equity = acc
                .balance()
                .await
                .with_context(|| format!("balance fetch failed for {}", acc.name()))?;
            Ok(AccountBalance {
                name: acc.name().to_string(),
                equity,
            })
        }))
        .await
    }

    async fn ensure_leverage(&self, accs: &[Arc<dyn AccountClient>], market: &str) -> Result<()> {
        try_join_all(
            accs.iter()
                .map(|acc| acc.set_leverage(market, self.cfg.leverage)),
        )
        .await?;
        Ok(())
    }

    /// Cancel all resting orders and reduce-only close all open positions on
    /// every account. Idempotent; returns (cancelled orders, closed positions).
    pub async fn close_all(
        accs: &[Arc<dyn AccountClient>],
        market: Option<&str>,
    ) -> Result<(usize, usize)> {
        let per_account = join_all(accs.iter().map(|acc| async move {
            let mut cancelled = 0usize;
            let mut closed = 0usize;

            for order in acc.orders(None, market).await? {
                acc.cancel_order(order.id).await?;
                cancelled += 1;
            }

            for pos in acc.positions(market).await? {
                acc.market_order(&pos.symbol, pos.side.opposite(), pos.amount, true)
                    .await?;
                closed += 1;
            }

            anyhow::Ok((cancelled, closed))
        }))
        .await;

        let mut cancelled = 0;
        let mut closed = 0;
        for result in per_account {
            let (c, p) = result?;
            cancelled += c;
            closed += p;
        }

        if cancelled + closed > 0 {
            info!(cancelled, closed, "Cancelled open orders and closed positions");
        }
        Ok((cancelled, closed))
    }

    /// Build the immutable cycle plan from one balance snapshot: sizes,
    /// sides and asset quantities (main leg first).
    async fn plan(
        &mut self,
        accs: &[Arc<dyn AccountClient>],
        market: &str,
        was: &[AccountBalance],
    ) -> Result<Vec<Act>> {
        let total: Decimal = was.iter().map(|b| b.equity).sum();
        let detail = was
            .iter()
            .map(|b| format!("{} {:.2}", b.name, b.equity))
            .collect::<Vec<_>>()
            .join(" | ");
        info!("Balances: {:.2} = {}", total, detail);

        let size_usd = self.cfg.trade_size_usd.sample(&mut self.rng);
        let sizes = self
            .allocator
            .allocate(&mut self.rng, was, size_usd, self.cfg.leverage)
            .context("no valid account combination found for trading")?;

        let main_side = if self.rng.gen_bool(0.5) {
            OrderSide::Ask
        } else {
            OrderSide::Bid
        };
        let rest_side = main_side.opposite();

        let acts = try_join_all(sizes.iter().enumerate().map(|(i, (name, size_usd))| {
            let side = if i == 0 { main_side } else { rest_side };
            async move {
                let acc = accs
                    .iter()
                    .find(|a| a.name() == name)
                    .with_context(|| format!("allocated account {name} missing"))?
                    .clone();

                let quote = acc.get_quote(market).await?;
                let qty = usd_to_qty(*size_usd, quote.mid(), quote.tick);

                anyhow::Ok(Act {
                    acc,
                    side,
                    size_usd: *size_usd,
                    qty,
                })
            }
        }))
        .await?;

        let total_usd: Decimal = acts.iter().map(|a| a.size_usd).sum();
        let rest_usd: Decimal = acts[1..].iter().map(|a| a.size_usd).sum();
        let rest_detail = acts[1..]
            .iter()
            .map(|a| a.size_usd.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            "Trade {}: {} = {} + {} ({})",
            market, total_usd, acts[0].size_usd, rest_usd, rest_detail
        );

        Ok(acts)
    }

    /// One full trade cycle: size, open, hold, close, report.
    async fn trade(&mut self) -> Result<()> {
        let mut accs = self.accs.clone();
        if self.cfg.first_as_main {
            accs[1..].shuffle(&mut self.rng);
        } else {
            accs.shuffle(&mut self.rng);
        }

        let was = Self::get_bals(&accs).await?;

        let market = self
            .cfg
            .markets
            .choose(&mut self.rng)
            .context("no markets configured")?
            .clone();

        let acts = self.plan(&accs, &market, &was).await?;

        self.ensure_leverage(&accs, &market).await?;

        // Open: all legs as simultaneous market orders, or the main leg as a
        // limit order first when limit mode is on.
        if !self.cfg.use_limit {
            try_join_all(acts.iter().map(|act| {
                self.executor
                    .market_open(act.acc.as_ref(), &market, act.side, act.qty, false)
            }))
            .await?;
        } else {
            let main = &acts[0];
            let outcome = self
                .executor
                .limit_open_and_wait(main.acc.as_ref(), &market, main.side, main.qty, false)
                .await?;
            if !outcome.is_filled() {
                warn!(?outcome, "Main leg not filled, aborting cycle");
                Self::close_all(&accs, None).await?;
                return Ok(());
            }

            try_join_all(acts[1..].iter().map(|act| {
                self.executor
                    .market_open(act.acc.as_ref(), &market, act.side, act.qty, false)
            }))
            .await?;
        }

        // Hold while the monitor watches for stop-loss breach and drift.
        let hold_sec = self.cfg.trade_duration.sample(&mut self.rng);
        info!("{}", utils::wait_msg(hold_sec));
        let safe = self
            .monitor
            .hold(&accs, &market, Duration::from_secs(hold_sec))
            .await;

        // Close the main leg with a reduce-only limit order when the hold
        // completed safely, then always close everything that remains.
        if self.cfg.use_limit && safe {
            let main = &acts[0];
            match self
                .executor
                .limit_open_and_wait(
                    main.acc.as_ref(),
                    &market,
                    main.side.opposite(),
                    main.qty,
                    true,
                )
                .await
            {
                Ok(outcome) if !outcome.is_filled() => {
                    warn!(?outcome, "Limit close of main leg not filled")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Limit close of main leg failed"),
            }
        }

        Self::close_all(&accs, None).await?;

        let now = Self::get_bals(&accs).await?;
        let cycle_delta: Decimal = now.iter().map(|b| b.equity).sum::<Decimal>()
            - was.iter().map(|b| b.equity).sum::<Decimal>();
        let per_account = now
            .iter()
            .zip(&was)
            .map(|(n, w)| format!("{} {:+.2}", n.name, n.equity - w.equity))
            .collect::<Vec<_>>()
            .join(" | ");
        let total_pnl: Decimal =
            now.iter().map(|b| b.equity).sum::<Decimal>() - self.initial_bal;
        info!(
            "Δ {:+.2} ~ {}; Total P/L: {:+.2}",
            cycle_delta, per_account, total_pnl
        );

        Ok(())
    }

    /// Inner cycle loop: clean slate, then trade / cooldown until an error
    /// forces a close and a restart.
    async fn cycle_loop(&mut self) -> Result<()> {
        Self::close_all(&self.accs, None).await?;

        loop {
            info!("{}", "-".repeat(60));
            match self.trade().await {
                Ok(()) => {
                    let wait_sec = self.cfg.trade_cooldown.sample(&mut self.rng);
                    info!("{}", utils::wait_msg(wait_sec));
                    tokio::time::sleep(Duration::from_secs(wait_sec)).await;
                }
                Err(e) => {
                    warn!(error = %e, "Trade cycle failed");
                    Self::close_all(&self.accs, None).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Run trade cycles until interrupted. Never returns under normal
    /// operation; only the preflight account-count check is fatal.
    pub async fn run_trade(&mut self) -> Result<()> {
        let count = self.accs.len();
        if !(2..=5).contains(&count) {
            bail!("accounts for trading must be between 2 and 5, got {count}");
        }

        self.initial_bal = Self::get_bals(&self.accs)
            .await?
            .iter()
            .map(|b| b.equity)
            .sum();

        loop {
            if let Err(e) = self.cycle_loop().await {
                error!(error = %e, "Trade loop failed, {}", utils::wait_msg(OUTER_BACKOFF.as_secs()));
                tokio::time::sleep(OUTER_BACKOFF).await;
            }
        }
    }
}
