//! File persistence for sigx.
//!
//! Everything is JSON Lines or plain JSON so records survive partial writes
//! and can be inspected with standard tools:
//! - `SignalJournal`: append-only queue journal (`signals.jsonl`)
//! - `RiskStateFile`: per-account risk state (`risk_state.json`)
//! - `OutcomeWriter`: daily execution outcome files (`outcomes_YYYY-MM-DD.jsonl`)

pub mod error;
pub mod journal;
pub mod outcomes;
pub mod risk_state;

pub use error::{PersistenceError, PersistenceResult};
pub use journal::{SignalJournal, DEFAULT_COMPACT_THRESHOLD};
pub use outcomes::OutcomeWriter;
pub use risk_state::RiskStateFile;
