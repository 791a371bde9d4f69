//! Bracket geometry validation.

use sigx_core::{Bracket, Price, Side};

use crate::error::ValidationError;

/// Validate protective levels around `entry`.
///
/// Long: `stop < entry < target`. Short: `target < entry < stop`.
/// Returns `None` when either level is missing; no bracket is attached then.
pub fn validate_bracket(
    side: Side,
    entry: Price,
    stop: Option<Price>,
    target: Option<Price>,
) -> Result<Option<Bracket>, ValidationError> {
    let (Some(stop), Some(target)) = (stop, target) else {
        return Ok(None);
    };

    let valid = match side {
        Side::Buy => stop < entry && entry < target,
        Side::Sell => target < entry && entry < stop,
    };
    if !valid {
        return Err(ValidationError::InvalidBracket {
            side: side.to_string(),
            stop,
            entry,
            target,
        });
    }

    Ok(Some(Bracket {
        stop_price: stop,
        target_price: target,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(v: rust_decimal::Decimal) -> Option<Price> {
        Some(Price::new(v))
    }

    #[test]
    fn test_long_bracket() {
        let entry = Price::new(dec!(100));
        let bracket = validate_bracket(Side::Buy, entry, p(dec!(95)), p(dec!(110)))
            .unwrap()
            .unwrap();
        assert_eq!(bracket.stop_price, Price::new(dec!(95)));
        assert_eq!(bracket.target_price, Price::new(dec!(110)));

        let inverted = validate_bracket(Side::Buy, entry, p(dec!(105)), p(dec!(90)));
        assert!(matches!(
            inverted,
            Err(ValidationError::InvalidBracket { .. })
        ));
    }

    #[test]
    fn test_short_bracket() {
        let entry = Price::new(dec!(100));
        assert!(validate_bracket(Side::Sell, entry, p(dec!(105)), p(dec!(90)))
            .unwrap()
            .is_some());
        assert!(validate_bracket(Side::Sell, entry, p(dec!(95)), p(dec!(110))).is_err());
    }

    #[test]
    fn test_level_equal_to_entry_is_invalid() {
        let entry = Price::new(dec!(100));
        assert!(validate_bracket(Side::Buy, entry, p(dec!(100)), p(dec!(110))).is_err());
        assert!(validate_bracket(Side::Sell, entry, p(dec!(105)), p(dec!(100))).is_err());
    }

    #[test]
    fn test_partial_bracket_is_ignored() {
        let entry = Price::new(dec!(100));
        assert_eq!(
            validate_bracket(Side::Buy, entry, p(dec!(95)), None).unwrap(),
            None
        );
        assert_eq!(validate_bracket(Side::Sell, entry, None, None).unwrap(), None);
    }
}
