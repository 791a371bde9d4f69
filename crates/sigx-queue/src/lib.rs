//! Durable signal queue for sigx.
//!
//! Holds every signal with its priority, schedule, expiry and status, and
//! hands them to workers through an atomic claim:
//! - `SignalQueue`: state machine and claim-based `dequeue_ready`
//! - `SignalStore`: write-through durability seam
//! - `MemorySignalStore`: non-durable store for tests and dry runs

pub mod config;
pub mod error;
pub mod queue;
pub mod store;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{QueueStats, SignalQueue};
pub use store::{MemorySignalStore, SignalStore};
