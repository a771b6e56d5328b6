//! Configuration management for the delta farmer.
//!
//! Settings load from a TOML file layered with `DF`-prefixed environment
//! variables; every tunable has a serde default.

use anyhow::{Context, Result};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Paper-trading accounts; real venue accounts are wired by the caller.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Markets eligible for trade cycles (one is picked at random per cycle).
    pub markets: Vec<String>,
    /// Leverage applied on every account/market pair.
    #[serde(default = "default_leverage")]
    pub leverage: u8,
    /// Target notional range per cycle, USD.
    pub trade_size_usd: SizeRange,
    /// Position hold duration range, seconds.
    pub trade_duration: TimeRange,
    /// Pause between cycles, seconds.
    pub trade_cooldown: TimeRange,
    /// Position safety check interval during the hold, seconds.
    #[serde(default = "default_heartbeat")]
    pub trade_heartbeat: u64,
    /// Stop-loss ROI threshold, fraction in (0, 1).
    #[serde(default = "default_pnl_limit")]
    pub pnl_limit: Decimal,
    /// Open/close the main leg with limit orders instead of market orders.
    #[serde(default)]
    pub use_limit: bool,
    /// Limit fill timeout measured from the first partial fill, seconds.
    #[serde(default = "default_limit_wait")]
    pub limit_wait: u64,
    /// Interval between BBO reprice attempts for a resting limit order, seconds.
    #[serde(default = "default_limit_reprice")]
    pub limit_reprice: u64,
    /// Market-order the unfilled remainder when the limit wait times out.
    #[serde(default = "default_true")]
    pub limit_market_fallback: bool,
    /// Pin the first configured account as the main leg instead of shuffling it.
    #[serde(default)]
    pub first_as_main: bool,
}

/// One paper-trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Starting equity for the simulated account.
    #[serde(default = "default_paper_balance")]
    pub balance: Decimal,
}

/// Inclusive decimal range sampled once per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl SizeRange {
    /// Uniform sample in whole cents, exact at two decimal places.
    pub fn sample(&self, rng: &mut impl Rng) -> Decimal {
        match (to_cents(self.min), to_cents(self.max)) {
            (Some(lo), Some(hi)) if lo <= hi => Decimal::new(rng.gen_range(lo..=hi), 2),
            // Bounds beyond cent granularity in i64; validate() keeps real
            // configs far away from here.
            _ => self.min.round_dp(2),
        }
    }
}

fn to_cents(value: Decimal) -> Option<i64> {
    (value * Decimal::ONE_HUNDRED).round().to_i64()
}

/// Inclusive duration range in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub min: u64,
    pub max: u64,
}

impl TimeRange {
    pub fn sample(&self, rng: &mut impl Rng) -> u64 {
        rng.gen_range(self.min..=self.max)
    }
}

fn default_leverage() -> u8 {
    10
}

fn default_heartbeat() -> u64 {
    15
}

fn default_pnl_limit() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_limit_wait() -> u64 {
    60
}

fn default_limit_reprice() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_paper_balance() -> Decimal {
    Decimal::new(1000, 0)
}

impl Config {
    /// Load configuration from a file plus `DF`-prefixed environment variables.
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(config::Environment::default().separator("__").prefix("DF"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Accounts enabled for trading.
    pub fn enabled_accounts(&self) -> Vec<&AccountConfig> {
        self.accounts.iter().filter(|a| a.enabled).collect()
    }

    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.markets.is_empty(), "at least one market is required");

        anyhow::ensure!(
            self.leverage >= 1 && self.leverage <= 50,
            "leverage must be between 1 and 50"
        );

        anyhow::ensure!(
            self.pnl_limit > Decimal::ZERO && self.pnl_limit < Decimal::ONE,
            "pnl_limit must be between 0 and 1"
        );

        anyhow::ensure!(
            self.trade_size_usd.min > Decimal::ZERO
                && self.trade_size_usd.min <= self.trade_size_usd.max,
            "trade_size_usd: min must be positive and <= max"
        );

        for (name, range) in [
            ("trade_duration", &self.trade_duration),
            ("trade_cooldown", &self.trade_cooldown),
        ] {
            anyhow::ensure!(
                range.min > 0 && range.min <= range.max,
                "{name}: min must be positive and <= max"
            );
        }

        anyhow::ensure!(self.trade_heartbeat > 0, "trade_heartbeat must be positive");

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            markets: vec!["BTC".to_string()],
            leverage: default_leverage(),
            trade_size_usd: SizeRange {
                min: Decimal::new(100, 0),
                max: Decimal::new(200, 0),
            },
            trade_duration: TimeRange { min: 60, max: 120 },
            trade_cooldown: TimeRange { min: 60, max: 300 },
            trade_heartbeat: default_heartbeat(),
            pnl_limit: default_pnl_limit(),
            use_limit: false,
            limit_wait: default_limit_wait(),
            limit_reprice: default_limit_reprice(),
            limit_market_fallback: default_true(),
            first_as_main: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = Config::default();
        config.leverage = 51;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pnl_limit = dec!(1.5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trade_duration = TimeRange { min: 100, max: 10 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.markets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_range_samples_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let size = SizeRange {
            min: dec!(50),
            max: dec!(150),
        };
        let time = TimeRange { min: 30, max: 90 };

        for _ in 0..100 {
            let s = size.sample(&mut rng);
            assert!(s >= dec!(50) && s <= dec!(150));
            assert_eq!(s, s.round_dp(2));

            let t = time.sample(&mut rng);
            assert!((30..=90).contains(&t));
        }
    }

    #[test]
    fn test_size_sample_is_exact_at_cent_granularity() {
        let mut rng = StdRng::seed_from_u64(3);

        // Degenerate range pins the sample to the exact configured value.
        let size = SizeRange {
            min: dec!(100.01),
            max: dec!(100.01),
        };
        assert_eq!(size.sample(&mut rng), dec!(100.01));

        // More cents than an f64 mantissa can hold; sampling must not lose
        // the trailing cent.
        let size = SizeRange {
            min: dec!(90071992547409.93),
            max: dec!(90071992547409.93),
        };
        assert_eq!(size.sample(&mut rng), dec!(90071992547409.93));
    }

    #[test]
    fn test_enabled_accounts_filter() {
        let mut config = Config::default();
        config.accounts = vec![
            AccountConfig {
                name: "a1".into(),
                enabled: true,
                balance: dec!(1000),
            },
            AccountConfig {
                name: "a2".into(),
                enabled: false,
                balance: dec!(1000),
            },
        ];
        let enabled = config.enabled_accounts();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "a1");
    }
}
