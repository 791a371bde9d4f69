//! Alert events and tier tracking.
//!
//! Drawdown and daily loss are each checked against three tiers of their
//! limit: 70% raises a warning, 90% a critical alert, and 100% a breach that
//! halts the account. Each tier fires once per metric per session.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, info, warn};

use sigx_core::AccountId;
use sigx_telemetry::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Breach,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Breach => "breach",
        }
    }

    /// Highest tier reached by `usage` (value / limit), if any.
    #[must_use]
    pub fn tier_for(usage: Decimal) -> Option<Self> {
        if usage >= Decimal::ONE {
            Some(Self::Breach)
        } else if usage >= Decimal::new(9, 1) {
            Some(Self::Critical)
        } else if usage >= Decimal::new(7, 1) {
            Some(Self::Warning)
        } else {
            None
        }
    }

    /// Tiers at or below `self`, lowest first.
    pub(crate) fn tiers_up_to(self) -> impl Iterator<Item = AlertSeverity> {
        [Self::Warning, Self::Critical, Self::Breach]
            .into_iter()
            .filter(move |t| *t <= self)
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    Drawdown,
    DailyLoss,
    /// Halt opened or closed.
    Breaker,
    /// Terminal brokerage failure.
    Execution,
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drawdown => write!(f, "drawdown"),
            Self::DailyLoss => write!(f, "daily_loss"),
            Self::Breaker => write!(f, "breaker"),
            Self::Execution => write!(f, "execution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub account_id: AccountId,
    pub severity: AlertSeverity,
    pub metric: AlertMetric,
    pub message: String,
    pub metrics: BTreeMap<String, Decimal>,
    pub timestamp_ms: u64,
}

impl AlertEvent {
    pub fn new(
        account_id: AccountId,
        severity: AlertSeverity,
        metric: AlertMetric,
        message: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            account_id,
            severity,
            metric,
            message: message.into(),
            metrics: BTreeMap::new(),
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn with_metric(mut self, name: &str, value: Decimal) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// Downstream consumer of alert events.
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: &AlertEvent);
}

/// Logs alerts through tracing and counts them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn publish(&self, alert: &AlertEvent) {
        Metrics::alert(alert.severity.as_str());
        match alert.severity {
            AlertSeverity::Info => info!(
                account = %alert.account_id,
                metric = %alert.metric,
                metrics = ?alert.metrics,
                "{}", alert.message
            ),
            AlertSeverity::Warning => warn!(
                account = %alert.account_id,
                metric = %alert.metric,
                metrics = ?alert.metrics,
                "{}", alert.message
            ),
            AlertSeverity::Critical | AlertSeverity::Breach => error!(
                account = %alert.account_id,
                severity = %alert.severity,
                metric = %alert.metric,
                metrics = ?alert.metrics,
                "{}", alert.message
            ),
        }
    }
}

/// Collects alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<AlertEvent>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().clone()
    }

    pub fn count(&self, severity: AlertSeverity) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.severity == severity)
            .count()
    }
}

impl AlertSink for MemoryAlertSink {
    fn publish(&self, alert: &AlertEvent) {
        self.alerts.lock().push(alert.clone());
    }
}
