//! Position sizing.

use rust_decimal::Decimal;

use sigx_core::{Price, Quantity};

use crate::error::ValidationError;

/// Quantity for an entry: `(equity * pct / 100 - exposure) / entry` rounded
/// down to `lot_size`. `exposure` is the notional already held in the symbol,
/// so an addition only fills the remaining headroom.
///
/// Fails with `ZeroQuantity` when the result rounds to nothing.
pub fn size_position(
    symbol: &str,
    equity: Decimal,
    position_size_pct: Decimal,
    exposure: Decimal,
    entry: Price,
    lot_size: Decimal,
) -> Result<Quantity, ValidationError> {
    let zero = || ValidationError::ZeroQuantity {
        symbol: symbol.to_string(),
    };

    if !entry.is_positive() || equity <= Decimal::ZERO {
        return Err(zero());
    }

    let notional = equity * position_size_pct / Decimal::ONE_HUNDRED - exposure;
    if notional <= Decimal::ZERO {
        return Err(zero());
    }
    let qty = Quantity::new(notional / entry.inner()).round_to_lot(lot_size);
    if qty.is_positive() {
        Ok(qty)
    } else {
        Err(zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_whole_share_sizing() {
        // 10% of 100k = 10k notional at 150 => 66.67 => 66 shares
        let qty = size_position("AAPL", dec!(100000), dec!(10), Decimal::ZERO, Price::new(dec!(150)), dec!(1))
            .unwrap();
        assert_eq!(qty.inner(), dec!(66));
    }

    #[test]
    fn test_fractional_sizing() {
        let qty = size_position(
            "BTC-USD",
            dec!(10000),
            dec!(10),
            Decimal::ZERO,
            Price::new(dec!(60000)),
            dec!(0.0001),
        )
        .unwrap();
        assert_eq!(qty.inner(), dec!(0.0166));
    }

    #[test]
    fn test_zero_quantity() {
        // 10% of 10k = 1k, cannot buy one 500k share
        let err = size_position(
            "BRK.A",
            dec!(10000),
            dec!(10),
            Decimal::ZERO,
            Price::new(dec!(500000)),
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ZeroQuantity { .. }));

        assert!(size_position(
            "X",
            Decimal::ZERO,
            dec!(10),
            Decimal::ZERO,
            Price::new(dec!(1)),
            dec!(1)
        )
        .is_err());
    }

    #[test]
    fn test_addition_sized_to_headroom() {
        // 10k cap with 3k held leaves 7k => 70 shares at 100
        let qty = size_position(
            "AAPL",
            dec!(100000),
            dec!(10),
            dec!(3000),
            Price::new(dec!(100)),
            dec!(1),
        )
        .unwrap();
        assert_eq!(qty.inner(), dec!(70));

        let err = size_position(
            "AAPL",
            dec!(100000),
            dec!(10),
            dec!(10000),
            Price::new(dec!(100)),
            dec!(1),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ZeroQuantity { .. }));
    }
}
