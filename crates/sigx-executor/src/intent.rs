//! Signal-to-order intent classification.

use sigx_core::{AssetClass, OrderIntent, Position, PositionSide, Side};

use crate::config::ExecutorConfig;
use crate::error::ValidationError;

/// Classify what an admitted signal should do given the current position.
///
/// | current position     | signal     | result                            |
/// |----------------------|------------|-----------------------------------|
/// | none                 | BUY        | OPEN                              |
/// | none                 | SELL       | OPEN short, or rejected for spot  |
/// | same direction       | any        | OPEN if additions allowed         |
/// | opposite direction   | any        | CLOSE, or FLIP if enabled         |
///
/// A reverse signal on an asset that cannot be shorted never flips into a
/// short; it degrades to CLOSE.
pub fn classify_intent(
    symbol: &str,
    action: Side,
    position: Option<&Position>,
    asset_class: AssetClass,
    config: &ExecutorConfig,
) -> Result<OrderIntent, ValidationError> {
    let opens_short = action == Side::Sell;

    match position {
        None => {
            if opens_short && !asset_class.supports_short() {
                return Err(ValidationError::UnsupportedShort {
                    symbol: symbol.to_string(),
                });
            }
            Ok(OrderIntent::Open)
        }
        Some(pos) if pos.side == PositionSide::from(action) => {
            if config.allow_additions {
                Ok(OrderIntent::Open)
            } else {
                Err(ValidationError::PositionExists {
                    symbol: symbol.to_string(),
                })
            }
        }
        Some(_) => {
            if config.flip_on_reverse && (!opens_short || asset_class.supports_short()) {
                Ok(OrderIntent::Flip)
            } else {
                Ok(OrderIntent::Close)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigx_core::{Price, Quantity};

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "AAPL".to_string(),
            side,
            quantity: Quantity::new(dec!(10)),
            entry_price: Price::new(dec!(100)),
            opened_at_ms: 0,
        }
    }

    fn flip_config() -> ExecutorConfig {
        ExecutorConfig {
            flip_on_reverse: true,
            ..ExecutorConfig::default()
        }
    }

    #[test]
    fn test_no_position_opens() {
        let config = ExecutorConfig::default();
        assert_eq!(
            classify_intent("AAPL", Side::Buy, None, AssetClass::Equity, &config),
            Ok(OrderIntent::Open)
        );
        assert_eq!(
            classify_intent("AAPL", Side::Sell, None, AssetClass::Equity, &config),
            Ok(OrderIntent::Open)
        );
    }

    #[test]
    fn test_spot_short_rejected() {
        let result = classify_intent(
            "BTC-USD",
            Side::Sell,
            None,
            AssetClass::Crypto,
            &ExecutorConfig::default(),
        );
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedShort { .. })
        ));
    }

    #[test]
    fn test_same_direction_requires_additions() {
        let long = position(PositionSide::Long);
        let config = ExecutorConfig::default();
        assert!(matches!(
            classify_intent("AAPL", Side::Buy, Some(&long), AssetClass::Equity, &config),
            Err(ValidationError::PositionExists { .. })
        ));

        let additions = ExecutorConfig {
            allow_additions: true,
            ..ExecutorConfig::default()
        };
        assert_eq!(
            classify_intent("AAPL", Side::Buy, Some(&long), AssetClass::Equity, &additions),
            Ok(OrderIntent::Open)
        );
    }

    #[test]
    fn test_reverse_closes_or_flips() {
        let long = position(PositionSide::Long);
        assert_eq!(
            classify_intent(
                "AAPL",
                Side::Sell,
                Some(&long),
                AssetClass::Equity,
                &ExecutorConfig::default()
            ),
            Ok(OrderIntent::Close)
        );
        assert_eq!(
            classify_intent("AAPL", Side::Sell, Some(&long), AssetClass::Equity, &flip_config()),
            Ok(OrderIntent::Flip)
        );
    }

    #[test]
    fn test_spot_reverse_never_flips_short() {
        let long = position(PositionSide::Long);
        assert_eq!(
            classify_intent(
                "BTC-USD",
                Side::Sell,
                Some(&long),
                AssetClass::Crypto,
                &flip_config()
            ),
            Ok(OrderIntent::Close)
        );
    }
}
