//! Application configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults:
//!
//! ```toml
//! [queue]
//! visibility_timeout_ms = 120000
//!
//! [risk]
//! daily_loss_limit_pct = 5
//!
//! [executor]
//! broker_timeout_ms = 10000
//!
//! [[instruments.symbols]]
//! symbol = "BTC-USD"
//! asset_class = "crypto"
//!
//! [persistence]
//! data_dir = "data"
//!
//! [[accounts]]
//! id = "paper-1"
//! workers = 2
//! starting_cash = 100000
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sigx_core::{AccountId, Instrument, InstrumentRegistry};
use sigx_executor::ExecutorConfig;
use sigx_queue::QueueConfig;
use sigx_risk::RiskConfig;

use crate::error::{AppError, AppResult};

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_buffer_size() -> usize {
    100
}

fn default_compact_threshold() -> usize {
    sigx_persistence::DEFAULT_COMPACT_THRESHOLD
}

fn default_workers() -> usize {
    2
}

fn default_starting_cash() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_accounts() -> Vec<AccountConfig> {
    vec![AccountConfig::default()]
}

/// `[persistence]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// When false, queue and risk state live in memory only.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Outcome records buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Dead journal lines tolerated before a purge compacts the journal.
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: usize,
}

fn default_enabled() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
            compact_threshold: default_compact_threshold(),
        }
    }
}

/// `[instruments]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstrumentsConfig {
    #[serde(default)]
    pub symbols: Vec<Instrument>,
}

/// `[workers]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Idle sleep between empty claims.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One `[[accounts]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: AccountId,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Paper brokerage starting balance.
    #[serde(default = "default_starting_cash")]
    pub starting_cash: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: AccountId::from("default"),
            workers: default_workers(),
            starting_cash: default_starting_cash(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub instruments: InstrumentsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default = "default_accounts")]
    pub accounts: Vec<AccountConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            risk: RiskConfig::default(),
            executor: ExecutorConfig::default(),
            instruments: InstrumentsConfig::default(),
            persistence: PersistenceConfig::default(),
            workers: WorkerConfig::default(),
            accounts: default_accounts(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.risk.validate()?;

        if self.accounts.is_empty() {
            return Err(AppError::Config("at least one account is required".to_string()));
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.id.clone()) {
                return Err(AppError::Config(format!("duplicate account {}", account.id)));
            }
            if account.workers == 0 {
                return Err(AppError::Config(format!(
                    "account {} needs at least one worker",
                    account.id
                )));
            }
        }
        if !seen.contains(&AccountId::from(self.queue.default_account.as_str())) {
            return Err(AppError::Config(format!(
                "queue.default_account {} is not a configured account",
                self.queue.default_account
            )));
        }
        if self.executor.broker_timeout_ms == 0 {
            return Err(AppError::Config("executor.broker_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn instrument_registry(&self) -> InstrumentRegistry {
        InstrumentRegistry::from_instruments(self.instruments.symbols.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigx_core::AssetClass;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.queue.visibility_timeout_ms, 120_000);
        assert_eq!(config.risk.limits.daily_loss_limit_pct, dec!(5));
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].id.as_str(), "default");
        assert!(config.persistence.enabled);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[queue]
visibility_timeout_ms = 30000
backoff_secs = [1, 2, 4]
default_account = "paper-1"

[risk]
min_confidence = 70
daily_loss_limit_pct = 3
session_reset_hour = 21

[[risk.correlation_groups]]
name = "tech"
symbols = ["AAPL", "MSFT"]
coefficient = 0.9

[executor]
broker_timeout_ms = 2000
flip_on_reverse = true
min_holding_bars = 10

[[instruments.symbols]]
symbol = "btc-usd"
asset_class = "crypto"
lot_size = 0.001

[persistence]
data_dir = "/tmp/sigx"
buffer_size = 10

[[accounts]]
id = "paper-1"
workers = 4
starting_cash = 50000
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.queue.backoff_secs, vec![1, 2, 4]);
        assert_eq!(config.queue.retention_secs, 86_400);
        assert_eq!(config.persistence.compact_threshold, 1_000);
        assert_eq!(config.risk.limits.min_confidence, dec!(70));
        assert_eq!(config.risk.session_reset_hour, 21);
        assert_eq!(config.risk.correlation_groups.len(), 1);
        assert!(config.executor.flip_on_reverse);
        assert_eq!(config.executor.min_holding_bars, 10);
        assert_eq!(config.accounts[0].workers, 4);
        assert_eq!(config.accounts[0].starting_cash, dec!(50000));

        let registry = config.instrument_registry();
        assert_eq!(registry.asset_class("BTC-USD"), AssetClass::Crypto);
        assert_eq!(registry.resolve("BTC-USD").lot_size(), dec!(0.001));
    }

    #[test]
    fn test_validation_errors() {
        let dup = r#"
[queue]
default_account = "a"

[[accounts]]
id = "a"

[[accounts]]
id = "a"
"#;
        assert!(matches!(AppConfig::from_toml(dup), Err(AppError::Config(_))));

        let unknown_default = r#"
[[accounts]]
id = "a"
"#;
        assert!(AppConfig::from_toml(unknown_default).is_err());

        let bad_hour = r#"
[risk]
session_reset_hour = 24
"#;
        assert!(matches!(AppConfig::from_toml(bad_hour), Err(AppError::Risk(_))));
    }
}
