//! sigx signal execution service.
//!
//! Wires the queue, per-account risk gates and executors into worker pools:
//! - `AppConfig`: TOML configuration
//! - `Application`: context object built once, with init and shutdown
//! - `Worker`: `dequeue_ready -> can_admit -> execute -> outcome` cycle
//! - `OutcomeTracker`: writes results back to the queue and the gate

pub mod app;
pub mod config;
pub mod error;
pub mod outcome;
pub mod worker;

pub use app::Application;
pub use config::{AccountConfig, AppConfig};
pub use error::{AppError, AppResult};
pub use outcome::{JsonlOutcomeSink, MemoryOutcomeSink, OutcomeSink, OutcomeTracker};
pub use worker::{sweep_once, Worker};
