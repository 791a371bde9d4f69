//! `[executor]` configuration section.

use serde::Deserialize;
use std::time::Duration;

fn default_broker_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Hard timeout for every brokerage call.
    #[serde(default = "default_broker_timeout_ms")]
    pub broker_timeout_ms: u64,
    /// Open an additional lot when a same-direction position exists.
    #[serde(default)]
    pub allow_additions: bool,
    /// Close then reopen in the opposite direction on a reverse signal.
    /// When false a reverse signal only closes.
    #[serde(default)]
    pub flip_on_reverse: bool,
    /// Bars a position must be held before take-profit may fire.
    #[serde(default)]
    pub min_holding_bars: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            broker_timeout_ms: default_broker_timeout_ms(),
            allow_additions: false,
            flip_on_reverse: false,
            min_holding_bars: 0,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_timeout_ms)
    }
}
