//! Asset classes and per-instrument trading capabilities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Asset class of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Equity,
    /// Spot crypto. Cannot be sold short.
    Crypto,
    Perpetual,
    Forex,
}

/// Capability table entry for an asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetCapabilities {
    pub supports_short: bool,
    pub fractional: bool,
}

impl AssetClass {
    #[must_use]
    pub const fn capabilities(&self) -> AssetCapabilities {
        match self {
            Self::Equity => AssetCapabilities {
                supports_short: true,
                fractional: false,
            },
            Self::Crypto => AssetCapabilities {
                supports_short: false,
                fractional: true,
            },
            Self::Perpetual => AssetCapabilities {
                supports_short: true,
                fractional: true,
            },
            Self::Forex => AssetCapabilities {
                supports_short: true,
                fractional: true,
            },
        }
    }

    #[must_use]
    pub fn supports_short(&self) -> bool {
        self.capabilities().supports_short
    }

    /// Default lot size when the instrument does not configure one.
    #[must_use]
    pub fn default_lot_size(&self) -> Decimal {
        if self.capabilities().fractional {
            Decimal::new(1, 4)
        } else {
            Decimal::ONE
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "equity"),
            Self::Crypto => write!(f, "crypto"),
            Self::Perpetual => write!(f, "perpetual"),
            Self::Forex => write!(f, "forex"),
        }
    }
}

/// Instrument definition as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    #[serde(default)]
    pub asset_class: AssetClass,
    /// Quantity step. Falls back to the asset class default.
    #[serde(default)]
    pub lot_size: Option<Decimal>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            lot_size: None,
        }
    }

    #[must_use]
    pub fn lot_size(&self) -> Decimal {
        self.lot_size
            .unwrap_or_else(|| self.asset_class.default_lot_size())
    }
}

/// Symbol to instrument lookup. Unknown symbols resolve to `Equity`.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<String, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut registry = Self::new();
        for instrument in instruments {
            registry.insert(instrument);
        }
        registry
    }

    pub fn insert(&mut self, mut instrument: Instrument) {
        instrument.symbol = instrument.symbol.to_uppercase();
        self.instruments
            .insert(instrument.symbol.clone(), instrument);
    }

    /// Resolve a symbol, defaulting to an equity instrument.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Instrument {
        self.instruments
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| Instrument::new(symbol.to_uppercase(), AssetClass::Equity))
    }

    #[must_use]
    pub fn asset_class(&self, symbol: &str) -> AssetClass {
        self.instruments
            .get(&symbol.to_uppercase())
            .map(|i| i.asset_class)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
