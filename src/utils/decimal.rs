//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Round a value to a multiple of the venue tick size.
///
/// `Decimal::round` uses banker's rounding, so midpoints resolve to the
/// even tick.
pub fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size == Decimal::ZERO {
        return value;
    }
    (value / tick_size).round() * tick_size
}

/// Convert a USD notional to an asset quantity at the given price, rounded
/// to the instrument lot.
pub fn usd_to_qty(usd: Decimal, price: Decimal, lot_size: Decimal) -> Decimal {
    if price == Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_to_tick(usd / price, lot_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(dec!(50123.456), dec!(0.01)), dec!(50123.46));
        assert_eq!(round_to_tick(dec!(50123.456), dec!(0.10)), dec!(50123.50));
        assert_eq!(round_to_tick(dec!(50123.456), dec!(1.00)), dec!(50123.00));
    }

    #[test]
    fn test_round_to_tick_half_to_even() {
        // Midpoints go to the even tick.
        assert_eq!(round_to_tick(dec!(0.125), dec!(0.01)), dec!(0.12));
        assert_eq!(round_to_tick(dec!(0.135), dec!(0.01)), dec!(0.14));
    }

    #[test]
    fn test_round_to_tick_idempotent() {
        for raw in [dec!(0.005), dec!(1.2345), dec!(99.999), dec!(12.425)] {
            let once = round_to_tick(raw, dec!(0.01));
            assert_eq!(round_to_tick(once, dec!(0.01)), once);
        }
    }

    #[test]
    fn test_usd_to_qty() {
        assert_eq!(usd_to_qty(dec!(100), dec!(50000), dec!(0.0001)), dec!(0.002));
        assert_eq!(usd_to_qty(dec!(100), dec!(0), dec!(0.0001)), Decimal::ZERO);
    }
}
