//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Risk state store error: {0}")]
    StateStore(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
