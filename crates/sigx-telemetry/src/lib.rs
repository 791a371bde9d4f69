//! Prometheus metrics and structured logging for sigx.
//!
//! - Prometheus counters and gauges for the queue, risk gate and broker calls
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
