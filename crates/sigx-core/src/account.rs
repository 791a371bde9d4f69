//! Account and position snapshots.
//!
//! Both are owned by the brokerage; the gate and executor only hold
//! read-through copies refreshed each cycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::Side;
use crate::{Price, Quantity};

/// Brokerage account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Point-in-time account balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub buying_power: Decimal,
    pub cash: Decimal,
    pub portfolio_value: Decimal,
    pub equity: Decimal,
    /// Highest equity seen this session. Never decreases.
    pub peak_equity: Decimal,
}

impl AccountSnapshot {
    /// Snapshot of a flat account holding only cash.
    #[must_use]
    pub fn flat(cash: Decimal) -> Self {
        Self {
            buying_power: cash,
            cash,
            portfolio_value: cash,
            equity: cash,
            peak_equity: cash,
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The order side that opens a position in this direction.
    #[must_use]
    pub fn entry_side(&self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// The order side that closes a position in this direction.
    #[must_use]
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }
}

impl From<Side> for PositionSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Self::Long,
            Side::Sell => Self::Short,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Open position in one symbol. At most one per symbol per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Quantity,
    pub entry_price: Price,
    /// Open timestamp (Unix ms).
    pub opened_at_ms: u64,
}

impl Position {
    /// Notional at entry.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity.notional(self.entry_price)
    }

    /// Unrealized P&L at `price`. Positive means profit.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Price) -> Decimal {
        let diff = price.inner() - self.entry_price.inner();
        match self.side {
            PositionSide::Long => diff * self.quantity.inner(),
            PositionSide::Short => -diff * self.quantity.inner(),
        }
    }

    /// Whether an order on `side` would reduce or close this position.
    #[must_use]
    pub fn is_closed_by(&self, side: Side) -> bool {
        self.side.exit_side() == side
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "ETH-USD".to_string(),
            side,
            quantity: Quantity::new(dec!(2)),
            entry_price: Price::new(dec!(100)),
            opened_at_ms: 0,
        }
    }

    #[test]
    fn test_unrealized_pnl_long_and_short() {
        let long = position(PositionSide::Long);
        assert_eq!(long.unrealized_pnl(Price::new(dec!(110))), dec!(20));

        let short = position(PositionSide::Short);
        assert_eq!(short.unrealized_pnl(Price::new(dec!(110))), dec!(-20));
    }

    #[test]
    fn test_is_closed_by() {
        assert!(position(PositionSide::Long).is_closed_by(Side::Sell));
        assert!(!position(PositionSide::Long).is_closed_by(Side::Buy));
        assert!(position(PositionSide::Short).is_closed_by(Side::Buy));
    }

    #[test]
    fn test_flat_snapshot() {
        let snap = AccountSnapshot::flat(dec!(10000));
        assert_eq!(snap.equity, dec!(10000));
        assert_eq!(snap.peak_equity, dec!(10000));
    }
}
