//! Queued trading signal and its status state machine.
//!
//! A `Signal` is created from an upstream `IncomingSignal` when it is
//! enqueued. After that only the lifecycle fields (status, retry_count,
//! last_error, scheduling timestamps, order_ref) change, and once a terminal
//! status is reached nothing changes at all.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::account::AccountId;
use crate::error::{CoreError, Result};
use crate::order::{Bracket, Side};
use crate::Price;

/// Unique signal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Create a new random signal ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SignalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SignalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a queued signal.
///
/// ```text
/// PENDING -> READY -> EXECUTING -> EXECUTED | FAILED | EXPIRED
///    |         |          |
///    |         |          +-> PENDING (retryable failure / reclaim)
///    +---------+-> CANCELLED | EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    #[default]
    Pending,
    Ready,
    Executing,
    Executed,
    Cancelled,
    Expired,
    Failed,
}

impl SignalStatus {
    pub const ALL: [SignalStatus; 7] = [
        Self::Pending,
        Self::Ready,
        Self::Executing,
        Self::Executed,
        Self::Cancelled,
        Self::Expired,
        Self::Failed,
    ];

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Cancelled | Self::Expired | Self::Failed
        )
    }

    /// Returns true if the signal is waiting to be dispatched.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// `Pending -> Executing` is allowed because a claim promotes and claims
    /// in one step. `Executing -> Expired` closes a signal the risk gate
    /// rejected after it was claimed.
    #[must_use]
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Executing)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Ready, Executing)
                | (Ready, Cancelled)
                | (Ready, Expired)
                | (Executing, Executed)
                | (Executing, Failed)
                | (Executing, Expired)
                | (Executing, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Executing => "EXECUTING",
            Self::Executed => "EXECUTED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal payload as produced by the upstream scoring process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSignal {
    /// Producer-assigned id. A fresh id is generated when absent.
    #[serde(default)]
    pub id: Option<SignalId>,
    /// Target account. The queue's default account is used when absent.
    #[serde(default)]
    pub account_id: Option<AccountId>,
    pub symbol: String,
    /// Producer timestamp (Unix ms).
    #[serde(alias = "timestamp")]
    pub timestamp_ms: u64,
    pub action: Side,
    /// Confidence score, 0-100.
    pub confidence: Decimal,
    pub entry_price: Price,
    #[serde(default)]
    pub stop_price: Option<Price>,
    #[serde(default)]
    pub target_price: Option<Price>,
    #[serde(default)]
    pub regime: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Explicit expiry (Unix ms). The queue TTL applies when absent.
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
}

/// A signal as held by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub account_id: AccountId,
    pub symbol: String,
    pub action: Side,
    pub confidence: Decimal,
    pub entry_price: Price,
    pub stop_price: Option<Price>,
    pub target_price: Option<Price>,
    pub regime: Option<String>,
    pub priority: i32,
    /// Producer timestamp (Unix ms).
    pub produced_at_ms: u64,
    /// When the signal entered the queue (Unix ms).
    pub queued_at_ms: u64,
    /// Earliest dispatch time; moved forward by retry backoff.
    pub scheduled_at_ms: u64,
    pub expires_at_ms: u64,
    pub status: SignalStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Brokerage order reference once executed.
    pub order_ref: Option<String>,
    /// When the current claim was taken (set while EXECUTING).
    pub claimed_at_ms: Option<u64>,
    /// Set when a previous attempt may have reached the brokerage
    /// (timeout or reclaimed claim); execution must reconcile first.
    #[serde(default)]
    pub needs_reconcile: bool,
    /// Bumped on every claim and every revoked claim. Completion must present
    /// the token it was claimed with.
    #[serde(default)]
    pub claim_token: u64,
    /// When a terminal status was reached (Unix ms).
    #[serde(default)]
    pub finished_at_ms: Option<u64>,
}

impl Signal {
    /// Build a queued signal from an upstream payload.
    ///
    /// Validates confidence range, entry price and symbol.
    pub fn from_incoming(
        incoming: IncomingSignal,
        default_account: &AccountId,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<Self> {
        if incoming.symbol.trim().is_empty() {
            return Err(CoreError::InvalidSignal("empty symbol".to_string()));
        }
        if incoming.confidence < Decimal::ZERO || incoming.confidence > Decimal::ONE_HUNDRED {
            return Err(CoreError::InvalidSignal(format!(
                "confidence {} outside 0-100",
                incoming.confidence
            )));
        }
        if !incoming.entry_price.is_positive() {
            return Err(CoreError::InvalidPrice(format!(
                "entry price must be positive, got {}",
                incoming.entry_price
            )));
        }

        Ok(Self {
            id: incoming.id.unwrap_or_else(SignalId::generate),
            account_id: incoming
                .account_id
                .unwrap_or_else(|| default_account.clone()),
            symbol: incoming.symbol.trim().to_uppercase(),
            action: incoming.action,
            confidence: incoming.confidence,
            entry_price: incoming.entry_price,
            stop_price: incoming.stop_price,
            target_price: incoming.target_price,
            regime: incoming.regime,
            priority: incoming.priority,
            produced_at_ms: incoming.timestamp_ms,
            queued_at_ms: now_ms,
            scheduled_at_ms: now_ms,
            expires_at_ms: incoming
                .expires_at_ms
                .unwrap_or_else(|| now_ms.saturating_add(ttl_ms)),
            status: SignalStatus::Pending,
            retry_count: 0,
            last_error: None,
            order_ref: None,
            claimed_at_ms: None,
            needs_reconcile: false,
            claim_token: 0,
            finished_at_ms: None,
        })
    }

    /// Bracket legs, present only when both stop and target are set.
    #[must_use]
    pub fn bracket(&self) -> Option<Bracket> {
        match (self.stop_price, self.target_price) {
            (Some(stop_price), Some(target_price)) => Some(Bracket {
                stop_price,
                target_price,
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    #[must_use]
    pub fn is_due_at(&self, now_ms: u64) -> bool {
        self.scheduled_at_ms <= now_ms
    }
}
