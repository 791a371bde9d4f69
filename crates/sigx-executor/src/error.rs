//! Executor error types.

use thiserror::Error;

use sigx_core::{ErrorKind, Price};

/// Signal cannot be turned into a valid order. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{symbol} does not support short selling")]
    UnsupportedShort { symbol: String },

    #[error("Invalid bracket for {side}: stop {stop}, entry {entry}, target {target}")]
    InvalidBracket {
        side: String,
        stop: Price,
        entry: Price,
        target: Price,
    },

    #[error("Position in {symbol} already open in the signal direction")]
    PositionExists { symbol: String },

    #[error("Sized quantity for {symbol} rounds to zero")]
    ZeroQuantity { symbol: String },

    #[error("No open position in {symbol} to close")]
    NoPosition { symbol: String },
}

/// Brokerage call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Brokerage call {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("Rate limited")]
    RateLimited,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Account blocked")]
    AccountBlocked,

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
}

impl BrokerError {
    /// Timeouts, rate limits and connectivity are retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited | Self::Connection(_)
        )
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::TransientBroker
        } else {
            ErrorKind::TerminalBroker
        }
    }

    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            _ if self.is_retryable() => "transient",
            _ => "terminal",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ExecutorError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Broker(e) => e.kind(),
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_classification() {
        assert!(BrokerError::Timeout {
            op: "place_order",
            timeout_ms: 10
        }
        .is_retryable());
        assert!(BrokerError::RateLimited.is_retryable());
        assert!(BrokerError::Connection("reset".to_string()).is_retryable());

        for terminal in [
            BrokerError::Rejected("no".to_string()),
            BrokerError::InsufficientFunds("x".to_string()),
            BrokerError::AccountBlocked,
            BrokerError::InvalidSymbol("ZZZ".to_string()),
        ] {
            assert!(!terminal.is_retryable());
            assert_eq!(terminal.kind(), ErrorKind::TerminalBroker);
        }
    }

    #[test]
    fn test_validation_maps_to_validation_kind() {
        let err = ExecutorError::from(ValidationError::ZeroQuantity {
            symbol: "BRK.A".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
