//! Execution results and error classification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::{AccountId, Position};
use crate::signal::SignalId;
use crate::{Price, Quantity};

// ============================================================================
// Error classification
// ============================================================================

/// How a failed execution should be handled by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad bracket, unsupported short, zero quantity. Never retried.
    Validation,
    /// Blocked by the risk gate. The signal expires.
    RiskRejection,
    /// Timeout, rate limit, connectivity. Retried with backoff.
    TransientBroker,
    /// Rejected, insufficient funds, blocked account, invalid symbol.
    TerminalBroker,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientBroker)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::RiskRejection => "risk_rejection",
            Self::TransientBroker => "transient_broker",
            Self::TerminalBroker => "terminal_broker",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Order intent
// ============================================================================

/// What the executor decided to do with an admitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderIntent {
    /// New entry (no position, or an addition when allowed).
    Open,
    /// Closing order only, no bracket legs.
    Close,
    /// Close confirmed, then open in the opposite direction.
    Flip,
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Close => write!(f, "CLOSE"),
            Self::Flip => write!(f, "FLIP"),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of executing one signal.
///
/// Exactly one of `order_ref` and `error_kind` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub signal_id: SignalId,
    pub account_id: AccountId,
    pub symbol: String,
    pub intent: Option<OrderIntent>,
    pub order_ref: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub filled_price: Option<Price>,
    pub filled_qty: Option<Quantity>,
    /// P&L realized by closing an existing position, if any.
    pub realized_pnl: Option<Decimal>,
    /// Completion timestamp (Unix ms).
    pub completed_at_ms: u64,
}

impl ExecutionOutcome {
    /// Successful execution.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn success(
        signal_id: SignalId,
        account_id: AccountId,
        symbol: String,
        intent: OrderIntent,
        order_ref: String,
        filled_price: Price,
        filled_qty: Quantity,
        completed_at_ms: u64,
    ) -> Self {
        Self {
            signal_id,
            account_id,
            symbol,
            intent: Some(intent),
            order_ref: Some(order_ref),
            error_kind: None,
            error: None,
            filled_price: Some(filled_price),
            filled_qty: Some(filled_qty),
            realized_pnl: None,
            completed_at_ms,
        }
    }

    /// Failed execution.
    #[must_use]
    pub fn failure(
        signal_id: SignalId,
        account_id: AccountId,
        symbol: String,
        kind: ErrorKind,
        error: impl Into<String>,
        completed_at_ms: u64,
    ) -> Self {
        Self {
            signal_id,
            account_id,
            symbol,
            intent: None,
            order_ref: None,
            error_kind: Some(kind),
            error: Some(error.into()),
            filled_price: None,
            filled_qty: None,
            realized_pnl: None,
            completed_at_ms,
        }
    }

    #[must_use]
    pub fn with_intent(mut self, intent: OrderIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    #[must_use]
    pub fn with_realized_pnl(mut self, pnl: Decimal) -> Self {
        self.realized_pnl = Some(pnl);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error_kind.is_some_and(|k| k.is_retryable())
    }
}

// ============================================================================
// Position delta
// ============================================================================

/// Effect of one execution on an account, applied to the risk gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub symbol: String,
    /// P&L realized by closing or reducing a position.
    pub realized_pnl: Decimal,
    /// Position in `symbol` after the execution. `None` means flat.
    pub position_after: Option<Position>,
}

impl PositionDelta {
    #[must_use]
    pub fn unchanged(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            realized_pnl: Decimal::ZERO,
            position_after: None,
        }
    }
}
