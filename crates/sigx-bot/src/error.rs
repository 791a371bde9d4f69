//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(sigx_core::AccountId),

    #[error("Queue error: {0}")]
    Queue(#[from] sigx_queue::QueueError),

    #[error("Risk error: {0}")]
    Risk(#[from] sigx_risk::RiskError),

    #[error("Brokerage error: {0}")]
    Broker(#[from] sigx_executor::BrokerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sigx_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigx_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
