//! Circuit breaker latch.
//!
//! Once triggered the latch stays triggered until `reset` (operator resume
//! or session rollover). A second trigger keeps the original reason.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, info, warn};

use rust_decimal::Decimal;

/// Reason the account was halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    MaxDrawdown { drawdown_pct: Decimal, limit_pct: Decimal },
    DailyLossLimit { loss_pct: Decimal, limit_pct: Decimal },
    Manual { message: String },
    /// Restored from persisted risk state.
    Restored { message: String },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxDrawdown {
                drawdown_pct,
                limit_pct,
            } => write!(
                f,
                "Drawdown {}% reached limit {}%",
                drawdown_pct.round_dp(2),
                limit_pct
            ),
            Self::DailyLossLimit {
                loss_pct,
                limit_pct,
            } => write!(
                f,
                "Daily loss {}% reached limit {}%",
                loss_pct.round_dp(2),
                limit_pct
            ),
            Self::Manual { message } => write!(f, "Manual: {}", message),
            Self::Restored { message } => write!(f, "{}", message),
        }
    }
}

/// Halt flag (CLOSED = trading, OPEN = halted).
#[derive(Debug, Default)]
pub struct HaltLatch {
    triggered: AtomicBool,
    /// Unix ms, 0 when not triggered.
    triggered_at: AtomicU64,
    reason: RwLock<Option<HaltReason>>,
}

impl HaltLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Trigger the latch. Returns `true` if this call opened it.
    pub fn trigger(&self, reason: HaltReason, now_ms: u64) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.triggered_at.store(now_ms, Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());
            error!(reason = %reason, "TRADING HALTED");
            true
        } else {
            warn!(new_reason = %reason, "Already halted, keeping original reason");
            false
        }
    }

    #[must_use]
    pub fn triggered_at(&self) -> Option<u64> {
        if self.is_triggered() {
            let ts = self.triggered_at.load(Ordering::SeqCst);
            if ts > 0 {
                return Some(ts);
            }
        }
        None
    }

    #[must_use]
    pub fn reason(&self) -> Option<HaltReason> {
        if self.is_triggered() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    /// Close the latch. Returns `true` if it was open.
    pub fn reset(&self) -> bool {
        if !self.is_triggered() {
            return false;
        }
        let previous = self.reason.write().take();
        self.triggered.store(false, Ordering::SeqCst);
        self.triggered_at.store(0, Ordering::SeqCst);
        info!(previous_reason = ?previous, "Halt cleared");
        true
    }
}
