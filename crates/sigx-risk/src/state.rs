//! Persisted per-account risk state.
//!
//! The gate saves a record on every halt, resume, session reset and peak
//! equity change, and loads it when the gate is created so a restart keeps
//! the session's peak and any active halt.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sigx_core::AccountId;

use crate::alert::AlertMetric;
use crate::error::RiskResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskStateRecord {
    pub account_id: AccountId,
    pub peak_equity: Decimal,
    pub halted: bool,
    pub halt_reason: Option<String>,
    /// Start of the session the record belongs to (Unix ms).
    pub daily_pnl_reset_at_ms: u64,
    pub session_start_equity: Decimal,
    /// Levels at the last operator resume this session.
    #[serde(default)]
    pub resume_levels: Option<ResumeLevels>,
}

/// Drawdown and daily loss (percent) when an operator resumed trading.
///
/// Until the session ends, the breaker only trips again once a metric is
/// worse than its level here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeLevels {
    pub drawdown_pct: Decimal,
    pub daily_loss_pct: Decimal,
}

impl ResumeLevels {
    /// Whether `value` for `metric` is past the resume watermark.
    #[must_use]
    pub fn exceeded_by(&self, metric: AlertMetric, value: Decimal) -> bool {
        match metric {
            AlertMetric::Drawdown => value > self.drawdown_pct,
            AlertMetric::DailyLoss => value > self.daily_loss_pct,
            _ => true,
        }
    }
}

pub trait RiskStateStore: Send + Sync {
    fn load(&self, account: &AccountId) -> RiskResult<Option<RiskStateRecord>>;
    fn save(&self, record: &RiskStateRecord) -> RiskResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryRiskStateStore {
    records: DashMap<AccountId, RiskStateRecord>,
}

impl MemoryRiskStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RiskStateStore for MemoryRiskStateStore {
    fn load(&self, account: &AccountId) -> RiskResult<Option<RiskStateRecord>> {
        Ok(self.records.get(account).map(|r| r.value().clone()))
    }

    fn save(&self, record: &RiskStateRecord) -> RiskResult<()> {
        self.records
            .insert(record.account_id.clone(), record.clone());
        Ok(())
    }
}
