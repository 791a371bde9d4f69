//! Outcome tracking.
//!
//! Closes the loop after each attempt: the result is written back onto the
//! queued signal, the fill is applied to the account's risk gate, and the
//! outcome record goes to every registered sink.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use sigx_core::{Clock, ErrorKind, ExecutionOutcome, Signal};
use sigx_executor::ExecutionReport;
use sigx_persistence::{OutcomeWriter, PersistenceResult};
use sigx_queue::SignalQueue;
use sigx_risk::{AdmissionDecision, AlertEvent, AlertMetric, AlertSeverity, AlertSink, RiskGate};

use crate::error::AppResult;

// ============================================================================
// Sinks
// ============================================================================

/// Downstream consumer of outcome records (performance tracking, reports).
pub trait OutcomeSink: Send + Sync {
    fn publish(&self, outcome: &ExecutionOutcome);
}

/// Appends outcomes to daily JSON Lines files.
pub struct JsonlOutcomeSink {
    writer: Mutex<OutcomeWriter>,
}

impl JsonlOutcomeSink {
    pub fn new(dir: impl AsRef<Path>, buffer_size: usize) -> Self {
        Self {
            writer: Mutex::new(OutcomeWriter::new(dir, buffer_size)),
        }
    }

    pub fn flush(&self) -> PersistenceResult<()> {
        self.writer.lock().flush()
    }

    pub fn close(&self) -> PersistenceResult<()> {
        self.writer.lock().close()
    }
}

impl OutcomeSink for JsonlOutcomeSink {
    fn publish(&self, outcome: &ExecutionOutcome) {
        if let Err(e) = self.writer.lock().record(outcome.clone()) {
            warn!(?e, signal_id = %outcome.signal_id, "Failed to write outcome record");
        }
    }
}

/// Keeps outcomes in memory.
#[derive(Debug, Default)]
pub struct MemoryOutcomeSink {
    outcomes: Mutex<Vec<ExecutionOutcome>>,
}

impl MemoryOutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.outcomes.lock().clone()
    }
}

impl OutcomeSink for MemoryOutcomeSink {
    fn publish(&self, outcome: &ExecutionOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}

// ============================================================================
// OutcomeTracker
// ============================================================================

pub struct OutcomeTracker {
    queue: Arc<SignalQueue>,
    sinks: Vec<Arc<dyn OutcomeSink>>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl OutcomeTracker {
    pub fn new(queue: Arc<SignalQueue>, alerts: Arc<dyn AlertSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            sinks: Vec::new(),
            alerts,
            clock,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Record an execution attempt made under the claim `claimed`.
    ///
    /// Success marks the signal EXECUTED and then applies the position delta
    /// to `gate`. Failure goes through the queue's retry policy; a terminal
    /// brokerage failure also raises a critical alert. A claim revoked while
    /// the attempt ran is refused by the queue and leaves the gate untouched.
    pub fn record(
        &self,
        gate: &RiskGate,
        claimed: &Signal,
        report: ExecutionReport,
    ) -> AppResult<Signal> {
        let ExecutionReport { outcome, delta } = report;

        let updated = if outcome.is_success() {
            let order_ref = outcome.order_ref.clone().unwrap_or_default();
            let updated = self.queue.mark_executed(claimed, order_ref)?;
            if let Some(delta) = &delta {
                gate.apply_fill(delta);
            }
            updated
        } else {
            let error = outcome.error.clone().unwrap_or_default();
            let updated = self
                .queue
                .mark_failed(claimed, error, outcome.is_retryable())?;
            if outcome.error_kind == Some(ErrorKind::TerminalBroker) {
                self.raise_execution_alert(&outcome);
            }
            updated
        };

        self.publish(&outcome);
        Ok(updated)
    }

    /// Record a risk gate rejection. The claimed signal expires with the
    /// rejection reason.
    pub fn record_rejection(&self, signal: &Signal, decision: &AdmissionDecision) -> AppResult<Signal> {
        let reason = decision
            .reason()
            .unwrap_or_else(|| "rejected".to_string());
        let updated = self.queue.mark_rejected(signal, reason.clone())?;

        let outcome = ExecutionOutcome::failure(
            signal.id.clone(),
            signal.account_id.clone(),
            signal.symbol.clone(),
            ErrorKind::RiskRejection,
            reason,
            self.clock.now_ms(),
        );
        self.publish(&outcome);
        Ok(updated)
    }

    fn publish(&self, outcome: &ExecutionOutcome) {
        for sink in &self.sinks {
            sink.publish(outcome);
        }
    }

    fn raise_execution_alert(&self, outcome: &ExecutionOutcome) {
        let message = format!(
            "Terminal brokerage failure for {} on {}: {}",
            outcome.signal_id,
            outcome.symbol,
            outcome.error.as_deref().unwrap_or("unknown")
        );
        info!(signal_id = %outcome.signal_id, "Raising execution alert");
        self.alerts.publish(&AlertEvent::new(
            outcome.account_id.clone(),
            AlertSeverity::Critical,
            AlertMetric::Execution,
            message,
            outcome.completed_at_ms,
        ));
    }
}
