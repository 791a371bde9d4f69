//! Worker tasks.
//!
//! Each account runs a pool of workers cycling
//! `dequeue_ready -> recover -> can_admit -> execute -> outcome`. The queue
//! claim is the only serialization point between workers. A single sweeper
//! task promotes, expires and reclaims signals on an interval.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sigx_core::{AccountId, Signal};
use sigx_executor::SignalExecutor;
use sigx_queue::{QueueError, QueueResult, SignalQueue};
use sigx_risk::RiskGate;
use sigx_telemetry::Metrics;

use crate::error::{AppError, AppResult};
use crate::outcome::OutcomeTracker;

// ============================================================================
// Worker
// ============================================================================

pub struct Worker {
    id: usize,
    account: AccountId,
    queue: Arc<SignalQueue>,
    gate: Arc<RiskGate>,
    executor: Arc<SignalExecutor>,
    tracker: Arc<OutcomeTracker>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        account: AccountId,
        queue: Arc<SignalQueue>,
        gate: Arc<RiskGate>,
        executor: Arc<SignalExecutor>,
        tracker: Arc<OutcomeTracker>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            account,
            queue,
            gate,
            executor,
            tracker,
            poll_interval,
        }
    }

    /// Run until `cancel` fires. A signal already claimed is always carried
    /// through to its outcome before the worker exits.
    pub async fn run(self, cancel: CancellationToken) {
        info!(account = %self.account, worker = self.id, "Worker started");
        while !cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(e) => {
                    warn!(account = %self.account, worker = self.id, error = %e, "Worker cycle failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!(account = %self.account, worker = self.id, "Worker stopped");
    }

    /// Claim and process at most one signal. Returns whether one was claimed.
    pub async fn run_once(&self) -> AppResult<bool> {
        let Some(signal) = self
            .queue
            .dequeue_ready(1, Some(&self.account))?
            .into_iter()
            .next()
        else {
            return Ok(false);
        };

        // Refresh cached account state; stale cache is used if the read fails
        match self.executor.account_state().await {
            Ok((snapshot, positions)) => {
                self.gate.refresh(snapshot, positions);
            }
            Err(e) => {
                warn!(account = %self.account, error = %e, "Account refresh failed, using cached state");
            }
        }

        // An earlier attempt that already filled is finished, not re-admitted
        if let Some(report) = self.executor.recover(&signal).await {
            return self.settle(self.tracker.record(&self.gate, &signal, report));
        }

        let decision = self.gate.can_admit(&signal);
        if !decision.is_allowed() {
            debug!(
                signal_id = %signal.id,
                decision = decision.label(),
                reason = ?decision.reason(),
                "Signal not admitted"
            );
            return self.settle(self.tracker.record_rejection(&signal, &decision));
        }

        let report = self
            .executor
            .execute(&signal, self.gate.limits().max_position_size_pct)
            .await;
        self.settle(self.tracker.record(&self.gate, &signal, report))
    }

    /// A claim revoked mid-attempt belongs to whichever worker holds it now.
    fn settle(&self, recorded: AppResult<Signal>) -> AppResult<bool> {
        match recorded {
            Ok(_) => Ok(true),
            Err(AppError::Queue(QueueError::StaleClaim { id, held, current })) => {
                info!(
                    signal_id = %id,
                    worker = self.id,
                    held,
                    current,
                    "Claim revoked during attempt, outcome discarded"
                );
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Sweeper
// ============================================================================

/// Run one sweep: reclaim stale claims, expire, promote due signals, then
/// purge terminal records past retention.
pub fn sweep_once(queue: &SignalQueue) -> QueueResult<()> {
    let reclaimed = queue.reclaim_stale()?;
    let expired = queue.expire_sweep()?;
    let promoted = queue.promote_ready()?;
    let purged = queue.purge_terminal()?;

    if !reclaimed.is_empty() || !expired.is_empty() || promoted > 0 || !purged.is_empty() {
        debug!(
            reclaimed = reclaimed.len(),
            expired = expired.len(),
            promoted,
            purged = purged.len(),
            "Queue sweep"
        );
    }
    Ok(())
}

pub async fn run_sweeper(queue: Arc<SignalQueue>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&queue) {
                    warn!(error = %e, "Queue sweep failed");
                }
                let stats = queue.stats();
                Metrics::queue_depth(stats.open());
            }
        }
    }
    debug!("Sweeper stopped");
}
