//! Risk limits and the `[risk]` configuration section.
//!
//! All `_pct` values are percentages: `5` means 5%.
//!
//! Example TOML:
//! ```toml
//! [risk]
//! min_confidence = 60
//! max_drawdown_pct = 10
//! daily_loss_limit_pct = 5
//! max_position_size_pct = 10
//! max_positions = 5
//! correlation_ceiling = 0.8
//! session_reset_hour = 0
//!
//! [[risk.correlation_groups]]
//! name = "mega_cap_tech"
//! symbols = ["AAPL", "MSFT", "GOOGL"]
//! coefficient = 0.85
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationGroup;
use crate::error::{RiskError, RiskResult};

fn default_min_confidence() -> Decimal {
    Decimal::new(60, 0)
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(10, 0)
}

fn default_daily_loss_limit_pct() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_position_size_pct() -> Decimal {
    Decimal::new(10, 0)
}

fn default_max_positions() -> usize {
    5
}

fn default_correlation_ceiling() -> Decimal {
    Decimal::new(8, 1)
}

/// Per-account admission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Signals below this confidence (0-100) are blocked.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Drawdown from session peak equity that halts the account.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Loss against session start equity that halts the account.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: Decimal,
    /// Maximum notional per symbol as a share of equity.
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Highest tolerated correlation (0-1) with an open position.
    #[serde(default = "default_correlation_ceiling")]
    pub correlation_ceiling: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_drawdown_pct: default_max_drawdown_pct(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            max_position_size_pct: default_max_position_size_pct(),
            max_positions: default_max_positions(),
            correlation_ceiling: default_correlation_ceiling(),
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> RiskResult<()> {
        let hundred = Decimal::ONE_HUNDRED;
        if self.min_confidence < Decimal::ZERO || self.min_confidence > hundred {
            return Err(RiskError::ConfigError(format!(
                "min_confidence must be within 0-100, got {}",
                self.min_confidence
            )));
        }
        for (name, value) in [
            ("max_drawdown_pct", self.max_drawdown_pct),
            ("daily_loss_limit_pct", self.daily_loss_limit_pct),
            ("max_position_size_pct", self.max_position_size_pct),
        ] {
            if value <= Decimal::ZERO || value > hundred {
                return Err(RiskError::ConfigError(format!(
                    "{name} must be within (0, 100], got {value}"
                )));
            }
        }
        if self.correlation_ceiling < Decimal::ZERO || self.correlation_ceiling > Decimal::ONE {
            return Err(RiskError::ConfigError(format!(
                "correlation_ceiling must be within 0-1, got {}",
                self.correlation_ceiling
            )));
        }
        if self.max_positions == 0 {
            return Err(RiskError::ConfigError(
                "max_positions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Notional a new entry is sized to: `equity * max_position_size_pct`.
    #[must_use]
    pub fn position_notional(&self, equity: Decimal) -> Decimal {
        equity * self.max_position_size_pct / Decimal::ONE_HUNDRED
    }
}

/// `[risk]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(flatten)]
    pub limits: RiskLimits,
    /// UTC hour at which the trading session (and daily P&L) resets.
    #[serde(default)]
    pub session_reset_hour: u32,
    #[serde(default)]
    pub correlation_groups: Vec<CorrelationGroup>,
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        self.limits.validate()?;
        if self.session_reset_hour > 23 {
            return Err(RiskError::ConfigError(format!(
                "session_reset_hour must be within 0-23, got {}",
                self.session_reset_hour
            )));
        }
        for group in &self.correlation_groups {
            if group.coefficient < Decimal::ZERO || group.coefficient > Decimal::ONE {
                return Err(RiskError::ConfigError(format!(
                    "correlation group {} coefficient must be within 0-1",
                    group.name
                )));
            }
        }
        Ok(())
    }
}
