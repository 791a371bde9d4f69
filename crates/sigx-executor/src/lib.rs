//! Order construction and execution for sigx.
//!
//! Turns an admitted signal plus the account's current position into one or
//! more brokerage calls:
//! - Intent classification (OPEN / CLOSE / FLIP) with asset-class rules
//! - Bracket geometry validation and position sizing
//! - Timeout-bounded brokerage calls with deterministic client order ids
//! - Reconcile-before-resubmit for signals that may already have reached
//!   the brokerage
//!
//! Also provides:
//! - `ExitPolicy`: stop-loss / take-profit with a minimum holding period
//! - `PaperBrokerage`: in-memory brokerage
//! - `MockBrokerage`: scripted brokerage for failure injection

pub mod bracket;
pub mod brokerage;
pub mod config;
pub mod error;
pub mod executor;
pub mod exits;
pub mod intent;
pub mod mock;
pub mod paper;
pub mod sizing;

pub use bracket::validate_bracket;
pub use brokerage::{BoxFuture, BrokerOrder, Brokerage, DynBrokerage, OrderRequest, OrderStatus};
pub use config::ExecutorConfig;
pub use error::{BrokerError, BrokerResult, ExecutorError, ExecutorResult, ValidationError};
pub use executor::{ExecutionReport, SignalExecutor};
pub use exits::{ExitDecision, ExitPolicy};
pub use intent::classify_intent;
pub use mock::{MockBrokerage, MockStep};
pub use paper::PaperBrokerage;
pub use sizing::size_position;
