//! Core domain types for the sigx signal execution pipeline.
//!
//! This crate provides the types shared by the queue, risk gate and executor:
//! - `Signal`, `SignalStatus`: Queued trading signal and its lifecycle
//! - `Position`, `AccountSnapshot`: Read-through copies of brokerage state
//! - `Price`, `Quantity`: Precision-safe numeric types
//! - `AssetClass`, `InstrumentRegistry`: Per-instrument trading capabilities
//! - `RetryPolicy`: Backoff schedule shared by every retrying caller
//! - `ExecutionOutcome`, `ErrorKind`: Result of executing a signal

pub mod account;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod instrument;
pub mod order;
pub mod retry;
pub mod session;
pub mod signal;

pub use account::{AccountId, AccountSnapshot, Position, PositionSide};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Price, Quantity};
pub use error::{CoreError, Result};
pub use execution::{ErrorKind, ExecutionOutcome, OrderIntent, PositionDelta};
pub use instrument::{AssetCapabilities, AssetClass, Instrument, InstrumentRegistry};
pub use order::{Bracket, ClientOrderId, OrderLeg, Side};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{next_session_start_ms, session_start_ms};
pub use signal::{IncomingSignal, Signal, SignalId, SignalStatus};
