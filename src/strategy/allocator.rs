//! Balance-aware randomized sizing across accounts.
//!
//! One account takes the "main" leg at half the target notional; the rest
//! split the other half with bounded random noise so individual trade sizes
//! do not look machine-generated. Every share is checked against the
//! account's margin capacity before it is accepted.

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::warn;

use crate::exchange::AccountBalance;
use crate::utils::decimal::round_to_tick;

/// Tick used for USD notional sizes.
pub const USD_TICK: Decimal = dec!(0.01);

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("at least two accounts are required, got {0}")]
    NotEnoughAccounts(usize),

    #[error("no account combination can cover {target} USD at {leverage}x")]
    NoSolution { target: Decimal, leverage: u8 },

    #[error("exact equal split impossible at this precision")]
    UnevenSplit,

    #[error("partition input out of range")]
    OutOfRange,
}

/// Splits a target notional across accounts within margin capacity.
#[derive(Debug, Clone)]
pub struct SizingAllocator {
    /// Fraction of theoretical margin capacity an account may use.
    pub safety: Decimal,
    /// Relative noise bound for the rest-side partition, in [0, 1].
    pub randomness: f64,
    /// Granularity the partition works at.
    pub precision: Decimal,
}

impl Default for SizingAllocator {
    fn default() -> Self {
        Self {
            safety: dec!(0.9),
            randomness: 0.1,
            precision: dec!(0.01),
        }
    }
}

/// Partition `total` into `n` parts that sum exactly to `total` (at the given
/// precision), each part an equal share plus bounded symmetric noise.
///
/// The noise vector is forced toward zero-sum by subtracting its mean;
/// residual integer drift is folded into the first part.
pub fn random_partition(
    rng: &mut impl Rng,
    total: Decimal,
    n: usize,
    randomness: f64,
    precision: Decimal,
) -> Result<Vec<Decimal>, AllocationError> {
    debug_assert!((0.0..=1.0).contains(&randomness));
    debug_assert!(precision > Decimal::ZERO);

    if n == 0 || total < Decimal::ZERO {
        return Err(AllocationError::OutOfRange);
    }

    let units = (total / precision)
        .round()
        .to_i64()
        .ok_or(AllocationError::OutOfRange)?;
    let n_i = n as i64;

    if units % n_i != 0 && randomness == 0.0 {
        return Err(AllocationError::UnevenSplit);
    }

    let avg_units = units / n_i;
    let max_noise = (randomness * avg_units as f64) as i64;
    let mut noise: Vec<i64> = (0..n).map(|_| rng.gen_range(-max_noise..=max_noise)).collect();

    // Force the noise toward zero-sum.
    let mean = noise.iter().sum::<i64>() / n_i;
    for x in noise.iter_mut() {
        *x -= mean;
    }

    let mut values: Vec<i64> = noise.iter().map(|x| avg_units + x).collect();

    // Fold rounding drift into the first part so the sum is exact.
    let correction = units - values.iter().sum::<i64>();
    values[0] += correction;

    Ok(values
        .into_iter()
        .map(|v| Decimal::from(v) * precision)
        .collect())
}

impl SizingAllocator {
    /// Margin capacity of one account.
    fn capacity(&self, equity: Decimal, leverage: u8) -> Decimal {
        equity * Decimal::from(leverage) * self.safety
    }

    /// Compute per-account USD sizes for a target notional.
    ///
    /// Tries every account as the main leg at half the target; if none
    /// works, falls back to the highest-equity account at its full
    /// capacity. Returned sizes are main-first and tick-rounded.
    pub fn allocate(
        &self,
        rng: &mut impl Rng,
        balances: &[AccountBalance],
        target_usd: Decimal,
        leverage: u8,
    ) -> Result<Vec<(String, Decimal)>, AllocationError> {
        if balances.len() < 2 {
            return Err(AllocationError::NotEnoughAccounts(balances.len()));
        }

        let half = target_usd / Decimal::TWO;

        for main in balances {
            if self.capacity(main.equity, leverage) < half {
                continue; // insufficient balance for this main
            }

            let rest: Vec<&AccountBalance> =
                balances.iter().filter(|b| b.name != main.name).collect();
            let shares = random_partition(rng, half, rest.len(), self.randomness, self.precision)?;

            let fits = rest
                .iter()
                .zip(&shares)
                .all(|(acc, share)| self.capacity(acc.equity, leverage) >= *share);
            if fits {
                return Ok(Self::build(main, half, &rest, &shares));
            }
        }

        // Fallback: highest-equity account as main, sized to its full capacity.
        warn!("Low balance on some accounts, trying fallback sizing...");
        let main = balances
            .iter()
            .max_by(|a, b| a.equity.cmp(&b.equity))
            .ok_or(AllocationError::NotEnoughAccounts(0))?;
        let main_size = self.capacity(main.equity, leverage);

        let rest: Vec<&AccountBalance> =
            balances.iter().filter(|b| b.name != main.name).collect();
        let shares = random_partition(rng, main_size, rest.len(), self.randomness, self.precision)?;

        for (acc, share) in rest.iter().zip(&shares) {
            if self.capacity(acc.equity, leverage) < *share {
                return Err(AllocationError::NoSolution {
                    target: target_usd,
                    leverage,
                });
            }
        }

        Ok(Self::build(main, main_size, &rest, &shares))
    }

    fn build(
        main: &AccountBalance,
        main_size: Decimal,
        rest: &[&AccountBalance],
        shares: &[Decimal],
    ) -> Vec<(String, Decimal)> {
        let mut out = Vec::with_capacity(rest.len() + 1);
        out.push((main.name.clone(), round_to_tick(main_size, USD_TICK)));
        for (acc, share) in rest.iter().zip(shares) {
            out.push((acc.name.clone(), round_to_tick(*share, USD_TICK)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn balances(entries: &[(&str, Decimal)]) -> Vec<AccountBalance> {
        entries
            .iter()
            .map(|(name, equity)| AccountBalance {
                name: name.to_string(),
                equity: *equity,
            })
            .collect()
    }

    #[test]
    fn test_partition_sums_exactly() {
        let mut rng = StdRng::seed_from_u64(1);
        for seed_total in [dec!(100), dec!(333.33), dec!(4500.07)] {
            let parts = random_partition(&mut rng, seed_total, 3, 0.1, dec!(0.01)).unwrap();
            let sum: Decimal = parts.iter().sum();
            assert_eq!(sum, round_to_tick(seed_total, dec!(0.01)));
        }
    }

    #[test]
    fn test_partition_even_split_without_noise() {
        let mut rng = StdRng::seed_from_u64(1);
        let parts = random_partition(&mut rng, dec!(90), 3, 0.0, dec!(0.01)).unwrap();
        assert_eq!(parts, vec![dec!(30), dec!(30), dec!(30)]);
    }

    #[test]
    fn test_partition_uneven_split_without_noise_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = random_partition(&mut rng, dec!(0.10), 3, 0.0, dec!(0.01)).unwrap_err();
        assert_eq!(err, AllocationError::UnevenSplit);
    }

    #[test]
    fn test_partition_noise_is_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        // 10% noise around a 50.00 base share, plus the drift correction on
        // the first element, keeps every part within a few ticks of [45, 55].
        for _ in 0..50 {
            let parts = random_partition(&mut rng, dec!(100), 2, 0.1, dec!(0.01)).unwrap();
            for part in &parts {
                assert!(*part >= dec!(44) && *part <= dec!(56), "part = {part}");
            }
        }
    }

    #[test]
    fn test_allocate_three_equal_accounts() {
        let mut rng = StdRng::seed_from_u64(3);
        let allocator = SizingAllocator::default();
        let bals = balances(&[("A", dec!(1000)), ("B", dec!(1000)), ("C", dec!(1000))]);

        let sizes = allocator
            .allocate(&mut rng, &bals, dec!(200), 10)
            .unwrap();

        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes[0].1, dec!(100)); // main leg = target / 2

        let rest_sum: Decimal = sizes[1..].iter().map(|(_, s)| *s).sum();
        assert_eq!(rest_sum, dec!(100));
        for (_, size) in &sizes[1..] {
            // ~50 each with 10% noise
            assert!(*size >= dec!(44) && *size <= dec!(56), "size = {size}");
        }

        // Every share within equity * leverage * safety = 9000.
        for (_, size) in &sizes {
            assert!(*size <= dec!(9000));
        }
    }

    #[test]
    fn test_allocate_sum_within_one_tick_of_target() {
        let allocator = SizingAllocator::default();
        let bals = balances(&[("A", dec!(500)), ("B", dec!(500)), ("C", dec!(500))]);

        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sizes = allocator
                .allocate(&mut rng, &bals, dec!(150.01), 10)
                .unwrap();
            let sum: Decimal = sizes.iter().map(|(_, s)| *s).sum();
            assert!((sum - dec!(150.01)).abs() <= dec!(0.01), "sum = {sum}");
        }
    }

    #[test]
    fn test_allocate_skips_undersized_main() {
        let mut rng = StdRng::seed_from_u64(5);
        let allocator = SizingAllocator::default();
        // A cannot hold the 500 main leg (capacity 450), B and C can.
        let bals = balances(&[("A", dec!(50)), ("B", dec!(1000)), ("C", dec!(1000))]);

        let sizes = allocator
            .allocate(&mut rng, &bals, dec!(1000), 10)
            .unwrap();
        assert_eq!(sizes[0].0, "B");
        assert_eq!(sizes[0].1, dec!(500));
    }

    #[test]
    fn test_allocate_fallback_no_solution() {
        let mut rng = StdRng::seed_from_u64(5);
        let allocator = SizingAllocator::default();
        // Half-target rule fails everywhere; fallback makes B the main at
        // 9000 and asks A (capacity 90) to cover the whole rest side.
        let bals = balances(&[("A", dec!(10)), ("B", dec!(1000))]);

        let err = allocator
            .allocate(&mut rng, &bals, dec!(10000), 10)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::NoSolution {
                target: dec!(10000),
                leverage: 10
            }
        );
    }

    #[test]
    fn test_allocate_fallback_uses_max_balance_capacity() {
        let mut rng = StdRng::seed_from_u64(9);
        let allocator = SizingAllocator::default();
        // Half of the 5000 target fits no account, so the fallback sizes the
        // main leg to A's full capacity (900) and splits it across B and C,
        // whose capacities (540 each) cover their ~450 shares.
        let bals = balances(&[("A", dec!(100)), ("B", dec!(60)), ("C", dec!(60))]);

        let sizes = allocator
            .allocate(&mut rng, &bals, dec!(5000), 10)
            .unwrap();
        assert_eq!(sizes[0].0, "A");
        assert_eq!(sizes[0].1, dec!(900)); // 100 * 10 * 0.9
        let rest_sum: Decimal = sizes[1..].iter().map(|(_, s)| *s).sum();
        assert_eq!(rest_sum, dec!(900));
    }

    #[test]
    fn test_allocate_requires_two_accounts() {
        let mut rng = StdRng::seed_from_u64(1);
        let allocator = SizingAllocator::default();
        let bals = balances(&[("A", dec!(1000))]);

        assert_eq!(
            allocator.allocate(&mut rng, &bals, dec!(100), 10),
            Err(AllocationError::NotEnoughAccounts(1))
        );
    }

    #[test]
    fn test_allocate_is_deterministic_per_seed() {
        let allocator = SizingAllocator::default();
        let bals = balances(&[("A", dec!(1000)), ("B", dec!(1000)), ("C", dec!(1000))]);

        let mut rng_a = StdRng::seed_from_u64(11);
        let mut rng_b = StdRng::seed_from_u64(11);
        assert_eq!(
            allocator.allocate(&mut rng_a, &bals, dec!(200), 10).unwrap(),
            allocator.allocate(&mut rng_b, &bals, dec!(200), 10).unwrap()
        );
    }
}
