//! Persistence error types.

use thiserror::Error;

use sigx_queue::QueueError;
use sigx_risk::RiskError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PersistenceError> for QueueError {
    fn from(e: PersistenceError) -> Self {
        QueueError::Store(e.to_string())
    }
}

impl From<PersistenceError> for RiskError {
    fn from(e: PersistenceError) -> Self {
        RiskError::StateStore(e.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
