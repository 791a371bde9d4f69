//! Queue configuration.

use serde::Deserialize;
use sigx_core::RetryPolicy;

fn default_visibility_timeout_ms() -> u64 {
    120_000
}

fn default_signal_ttl_secs() -> u64 {
    3_600
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_secs() -> Vec<u64> {
    vec![60, 300, 900, 3_600, 21_600]
}

fn default_max_backoff_secs() -> u64 {
    21_600
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_retention_secs() -> u64 {
    86_400
}

fn default_account() -> String {
    "default".to_string()
}

/// `[queue]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// How long a claim may stay EXECUTING before it is reclaimed.
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
    /// Expiry applied when the producer does not supply one.
    #[serde(default = "default_signal_ttl_secs")]
    pub signal_ttl_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry delay schedule, indexed by retry count.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Interval of the promote / expire / reclaim sweeper.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Terminal records older than this are purged by the sweeper.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Account used for signals that do not name one.
    #[serde(default = "default_account")]
    pub default_account: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: default_visibility_timeout_ms(),
            signal_ttl_secs: default_signal_ttl_secs(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            retention_secs: default_retention_secs(),
            default_account: default_account(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(self.max_retries, &self.backoff_secs, self.max_backoff_secs)
    }

    #[must_use]
    pub fn signal_ttl_ms(&self) -> u64 {
        self.signal_ttl_secs.saturating_mul(1_000)
    }

    #[must_use]
    pub fn retention_ms(&self) -> u64 {
        self.retention_secs.saturating_mul(1_000)
    }
}
