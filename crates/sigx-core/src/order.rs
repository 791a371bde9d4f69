//! Order-related types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signal::SignalId;
use crate::Price;

/// Trade direction of a signal or an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Protective child orders attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub stop_price: Price,
    pub target_price: Price,
}

/// Which broker call of a signal's execution an order belongs to.
///
/// A FLIP issues a `Close` leg followed by an `Open` leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderLeg {
    Open,
    Close,
}

impl fmt::Display for OrderLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Client order ID for idempotency.
///
/// Derived deterministically from the signal id and leg, so a resubmission of
/// the same signal after a timeout carries the same id and can be matched
/// against the brokerage's open orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Format: `sigx_{signal_id}_{leg}`
    pub fn for_leg(signal_id: &SignalId, leg: OrderLeg) -> Self {
        Self(format!("sigx_{}_{}", signal_id, leg))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_client_order_id_deterministic() {
        let id = SignalId::from("abc".to_string());
        let first = ClientOrderId::for_leg(&id, OrderLeg::Open);
        let again = ClientOrderId::for_leg(&id, OrderLeg::Open);
        assert_eq!(first, again);
        assert_eq!(first.as_str(), "sigx_abc_open");
        assert_ne!(first, ClientOrderId::for_leg(&id, OrderLeg::Close));
    }

    #[test]
    fn test_side_serde_uppercase() {
        let json = serde_json::to_string(&Side::Sell).unwrap();
        assert_eq!(json, "\"SELL\"");
        let side: Side = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(side, Side::Buy);
    }
}
