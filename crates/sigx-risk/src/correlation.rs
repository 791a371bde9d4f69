//! Correlation between a candidate entry and the open positions.
//!
//! An estimator returns a coefficient in `[0, 1]`; the gate blocks the entry
//! when it exceeds `correlation_ceiling`. Opposite-direction positions in
//! the same group offset each other and do not count.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use sigx_core::{Position, PositionSide};

pub trait CorrelationEstimator: Send + Sync {
    /// Highest correlation between a new `side` entry in `symbol` and any of
    /// `open` positions.
    fn correlation(&self, symbol: &str, side: PositionSide, open: &[Position]) -> Decimal;
}

/// Treats every symbol as uncorrelated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrelation;

impl CorrelationEstimator for NoCorrelation {
    fn correlation(&self, _symbol: &str, _side: PositionSide, _open: &[Position]) -> Decimal {
        Decimal::ZERO
    }
}

/// A configured set of symbols that move together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationGroup {
    pub name: String,
    pub symbols: Vec<String>,
    pub coefficient: Decimal,
}

#[derive(Debug)]
struct ResolvedGroup {
    symbols: HashSet<String>,
    coefficient: Decimal,
}

/// Static correlation from configured symbol groups.
#[derive(Debug, Default)]
pub struct GroupCorrelation {
    groups: Vec<ResolvedGroup>,
}

impl GroupCorrelation {
    pub fn new(groups: &[CorrelationGroup]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|g| ResolvedGroup {
                    symbols: g.symbols.iter().map(|s| s.to_uppercase()).collect(),
                    coefficient: g.coefficient.clamp(Decimal::ZERO, Decimal::ONE),
                })
                .collect(),
        }
    }
}

impl CorrelationEstimator for GroupCorrelation {
    fn correlation(&self, symbol: &str, side: PositionSide, open: &[Position]) -> Decimal {
        let symbol = symbol.to_uppercase();
        self.groups
            .iter()
            .filter(|g| g.symbols.contains(&symbol))
            .filter(|g| {
                open.iter().any(|p| {
                    p.side == side && p.symbol != symbol && g.symbols.contains(&p.symbol)
                })
            })
            .map(|g| g.coefficient)
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}
