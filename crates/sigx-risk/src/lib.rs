//! Risk admission control for sigx.
//!
//! Implements the per-account checks every signal must pass before it is
//! turned into an order:
//! - Minimum confidence
//! - Position count and per-symbol position size
//! - Correlation ceiling across open positions
//! - Drawdown and daily-loss circuit breaker
//!
//! Also provides:
//! - HaltLatch: Sticky halt flag with its reason
//! - Alert tiers and the `AlertSink` seam
//! - RiskGateRegistry: One gate per account
//! - RiskStateStore: Persistence seam for peak equity and halt state

pub mod alert;
pub mod correlation;
pub mod error;
pub mod gate;
pub mod halt;
pub mod limits;
pub mod registry;
pub mod state;

pub use alert::{AlertEvent, AlertMetric, AlertSeverity, AlertSink, LogAlertSink, MemoryAlertSink};
pub use correlation::{CorrelationEstimator, CorrelationGroup, GroupCorrelation, NoCorrelation};
pub use error::{RiskError, RiskResult};
pub use gate::{AdmissionDecision, RiskGate, RiskRejection, RiskView};
pub use halt::{HaltLatch, HaltReason};
pub use limits::{RiskConfig, RiskLimits};
pub use registry::RiskGateRegistry;
pub use state::{MemoryRiskStateStore, ResumeLevels, RiskStateRecord, RiskStateStore};
