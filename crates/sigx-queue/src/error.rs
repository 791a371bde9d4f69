//! Queue error types.

use sigx_core::{CoreError, SignalId, SignalStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Duplicate signal: {0}")]
    DuplicateSignal(SignalId),

    #[error("Signal not found: {0}")]
    NotFound(SignalId),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: SignalId,
        from: SignalStatus,
        to: SignalStatus,
    },

    #[error("Stale claim on {id}: token {held} superseded by {current}")]
    StaleClaim {
        id: SignalId,
        held: u64,
        current: u64,
    },

    #[error("Signal {0} is executing and cannot be cancelled")]
    NotCancellable(SignalId),

    #[error("Invalid signal: {0}")]
    InvalidSignal(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
