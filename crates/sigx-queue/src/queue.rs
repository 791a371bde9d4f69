//! Signal queue and its claim-based dispatch.
//!
//! All records live in one map behind a single `parking_lot::Mutex`. Every
//! status change (including the claim in `dequeue_ready`) validates the edge,
//! writes through to the store and commits under that one guard, so two
//! pollers can never claim the same signal.
//!
//! Each claim carries a token. Completing a signal requires the token it was
//! claimed with, so a worker whose claim was reclaimed cannot overwrite the
//! outcome of the worker that holds it now.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use sigx_core::{
    AccountId, Clock, IncomingSignal, RetryDecision, RetryPolicy, Signal, SignalId, SignalStatus,
};
use sigx_telemetry::Metrics;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{MemorySignalStore, SignalStore};

// ============================================================================
// QueueStats
// ============================================================================

/// Record counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub ready: usize,
    pub executing: usize,
    pub executed: usize,
    pub cancelled: usize,
    pub expired: usize,
    pub failed: usize,
}

impl QueueStats {
    fn record(&mut self, status: SignalStatus) {
        match status {
            SignalStatus::Pending => self.pending += 1,
            SignalStatus::Ready => self.ready += 1,
            SignalStatus::Executing => self.executing += 1,
            SignalStatus::Executed => self.executed += 1,
            SignalStatus::Cancelled => self.cancelled += 1,
            SignalStatus::Expired => self.expired += 1,
            SignalStatus::Failed => self.failed += 1,
        }
    }

    #[must_use]
    pub fn count(&self, status: SignalStatus) -> usize {
        match status {
            SignalStatus::Pending => self.pending,
            SignalStatus::Ready => self.ready,
            SignalStatus::Executing => self.executing,
            SignalStatus::Executed => self.executed,
            SignalStatus::Cancelled => self.cancelled,
            SignalStatus::Expired => self.expired,
            SignalStatus::Failed => self.failed,
        }
    }

    /// Signals not yet in a terminal status.
    #[must_use]
    pub fn open(&self) -> usize {
        self.pending + self.ready + self.executing
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.open() + self.executed + self.cancelled + self.expired + self.failed
    }
}

// ============================================================================
// SignalQueue
// ============================================================================

pub struct SignalQueue {
    signals: Mutex<HashMap<SignalId, Signal>>,
    store: Arc<dyn SignalStore>,
    config: QueueConfig,
    retry: RetryPolicy,
    default_account: AccountId,
    clock: Arc<dyn Clock>,
}

impl SignalQueue {
    /// Create an empty queue backed by an in-memory store.
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(
            Arc::new(MemorySignalStore::new()),
            config,
            clock,
            HashMap::new(),
        )
    }

    /// Rebuild the queue from a durable store.
    ///
    /// Records left EXECUTING by a previous process have no live worker, so
    /// they go straight back to PENDING flagged for reconciliation.
    pub fn open(
        store: Arc<dyn SignalStore>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        let records = store.load_all()?;
        let signals: HashMap<SignalId, Signal> =
            records.into_iter().map(|s| (s.id.clone(), s)).collect();
        let queue = Self::build(store, config, clock, signals);

        let recovered = queue.requeue_executing(|_| true, "recovered after restart")?;
        let stats = queue.stats();
        info!(
            total = stats.total(),
            open = stats.open(),
            recovered = recovered.len(),
            "Signal queue opened"
        );
        Ok(queue)
    }

    fn build(
        store: Arc<dyn SignalStore>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        signals: HashMap<SignalId, Signal>,
    ) -> Self {
        Self {
            signals: Mutex::new(signals),
            store,
            retry: config.retry_policy(),
            default_account: AccountId::new(config.default_account.clone()),
            config,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ------------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------------

    /// Validate and add a signal as PENDING.
    pub fn enqueue(&self, incoming: IncomingSignal) -> QueueResult<SignalId> {
        let now = self.clock.now_ms();
        let signal = Signal::from_incoming(
            incoming,
            &self.default_account,
            now,
            self.config.signal_ttl_ms(),
        )?;

        let mut signals = self.signals.lock();
        if signals.contains_key(&signal.id) {
            return Err(QueueError::DuplicateSignal(signal.id));
        }
        self.store.put(&signal)?;

        let id = signal.id.clone();
        debug!(
            signal_id = %id,
            account = %signal.account_id,
            symbol = %signal.symbol,
            priority = signal.priority,
            expires_at_ms = signal.expires_at_ms,
            "Signal enqueued"
        );
        signals.insert(id.clone(), signal);
        Metrics::signal_enqueued();
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------------

    /// Claim up to `limit` due signals and mark them EXECUTING.
    ///
    /// Ordered by priority desc, then queued_at desc. Expired entries are
    /// never claimed. `account` restricts the claim to one account.
    pub fn dequeue_ready(
        &self,
        limit: usize,
        account: Option<&AccountId>,
    ) -> QueueResult<Vec<Signal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now_ms();
        let mut signals = self.signals.lock();

        let mut candidates: Vec<(i32, u64, SignalId)> = signals
            .values()
            .filter(|s| {
                s.status.is_waiting()
                    && s.is_due_at(now)
                    && !s.is_expired_at(now)
                    && account.map_or(true, |a| &s.account_id == a)
            })
            .map(|s| (s.priority, s.queued_at_ms, s.id.clone()))
            .collect();
        candidates.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, _, id) in candidates {
            match self.transition(&mut signals, &id, SignalStatus::Executing, |s| {
                s.claimed_at_ms = Some(now);
                s.claim_token += 1;
            }) {
                Ok(signal) => {
                    Metrics::signal_claimed();
                    claimed.push(signal);
                }
                Err(e) if claimed.is_empty() => return Err(e),
                Err(e) => {
                    warn!(signal_id = %id, error = %e, "Claim failed, returning partial batch");
                    break;
                }
            }
        }

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "Signals claimed");
        }
        Ok(claimed)
    }

    /// EXECUTING -> EXECUTED for the current holder of `claimed`.
    pub fn mark_executed(
        &self,
        claimed: &Signal,
        order_ref: impl Into<String>,
    ) -> QueueResult<Signal> {
        let id = &claimed.id;
        let order_ref = order_ref.into();
        let mut signals = self.signals.lock();
        Self::check_claim(&signals, claimed, SignalStatus::Executed)?;
        let signal = self.transition(&mut signals, id, SignalStatus::Executed, |s| {
            s.order_ref = Some(order_ref);
            s.claimed_at_ms = None;
            s.needs_reconcile = false;
        })?;
        info!(signal_id = %id, order_ref = ?signal.order_ref, "Signal executed");
        Ok(signal)
    }

    /// EXECUTING -> PENDING with backoff, or FAILED once retries are used up
    /// or the failure is not retryable.
    ///
    /// A retried signal is flagged for reconciliation because the failed
    /// attempt may still have reached the brokerage.
    pub fn mark_failed(
        &self,
        claimed: &Signal,
        error: impl Into<String>,
        retryable: bool,
    ) -> QueueResult<Signal> {
        let id = &claimed.id;
        let error = error.into();
        let now = self.clock.now_ms();
        let mut signals = self.signals.lock();

        let retry_count = Self::check_claim(&signals, claimed, SignalStatus::Failed)?;
        match self.retry.decide(retryable, retry_count) {
            RetryDecision::RetryAfter(delay) => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let signal = self.transition(&mut signals, id, SignalStatus::Pending, |s| {
                    s.retry_count += 1;
                    s.scheduled_at_ms = now.saturating_add(delay_ms);
                    s.last_error = Some(error);
                    s.claimed_at_ms = None;
                    s.needs_reconcile = true;
                })?;
                warn!(
                    signal_id = %id,
                    retry_count = signal.retry_count,
                    delay_ms,
                    error = ?signal.last_error,
                    "Signal rescheduled after retryable failure"
                );
                Ok(signal)
            }
            RetryDecision::GiveUp => {
                let signal = self.transition(&mut signals, id, SignalStatus::Failed, |s| {
                    s.last_error = Some(error);
                    s.claimed_at_ms = None;
                })?;
                warn!(
                    signal_id = %id,
                    retryable,
                    retry_count = signal.retry_count,
                    error = ?signal.last_error,
                    "Signal failed"
                );
                Ok(signal)
            }
        }
    }

    /// Close a claimed signal the risk gate rejected. It expires with the
    /// rejection reason recorded.
    pub fn mark_rejected(&self, claimed: &Signal, reason: impl Into<String>) -> QueueResult<Signal> {
        let id = &claimed.id;
        let reason = reason.into();
        let mut signals = self.signals.lock();
        Self::check_claim(&signals, claimed, SignalStatus::Expired)?;
        let signal = self.transition(&mut signals, id, SignalStatus::Expired, |s| {
            s.last_error = Some(reason);
            s.claimed_at_ms = None;
        })?;
        info!(signal_id = %id, reason = ?signal.last_error, "Signal rejected by risk gate");
        Ok(signal)
    }

    /// PENDING/READY -> CANCELLED. An EXECUTING signal cannot be cancelled.
    pub fn cancel(&self, id: &SignalId) -> QueueResult<Signal> {
        let mut signals = self.signals.lock();
        match signals.get(id).map(|s| s.status) {
            None => return Err(QueueError::NotFound(id.clone())),
            Some(SignalStatus::Executing) => return Err(QueueError::NotCancellable(id.clone())),
            Some(_) => {}
        }
        let signal = self.transition(&mut signals, id, SignalStatus::Cancelled, |_| {})?;
        info!(signal_id = %id, "Signal cancelled");
        Ok(signal)
    }

    // ------------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------------

    /// PENDING -> READY for signals whose scheduled time has arrived.
    pub fn promote_ready(&self) -> QueueResult<usize> {
        let now = self.clock.now_ms();
        let mut signals = self.signals.lock();
        let due: Vec<SignalId> = signals
            .values()
            .filter(|s| {
                s.status == SignalStatus::Pending && s.is_due_at(now) && !s.is_expired_at(now)
            })
            .map(|s| s.id.clone())
            .collect();

        for id in &due {
            self.transition(&mut signals, id, SignalStatus::Ready, |_| {})?;
        }
        Ok(due.len())
    }

    /// PENDING/READY -> EXPIRED for signals past their expiry.
    pub fn expire_sweep(&self) -> QueueResult<Vec<SignalId>> {
        let now = self.clock.now_ms();
        let mut signals = self.signals.lock();
        let expired: Vec<SignalId> = signals
            .values()
            .filter(|s| s.status.is_waiting() && s.is_expired_at(now))
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            self.transition(&mut signals, id, SignalStatus::Expired, |s| {
                if s.last_error.is_none() {
                    s.last_error = Some("expired before dispatch".to_string());
                }
            })?;
            debug!(signal_id = %id, "Signal expired");
        }
        Ok(expired)
    }

    /// EXECUTING -> PENDING for claims older than the visibility timeout.
    ///
    /// Reclaimed signals are flagged `needs_reconcile` so the executor checks
    /// live brokerage state before submitting again.
    pub fn reclaim_stale(&self) -> QueueResult<Vec<SignalId>> {
        let now = self.clock.now_ms();
        let timeout = self.config.visibility_timeout_ms;
        self.requeue_executing(
            |s| {
                s.claimed_at_ms
                    .map_or(true, |claimed| now.saturating_sub(claimed) >= timeout)
            },
            "claim exceeded visibility timeout",
        )
    }

    /// Drop terminal records finished more than `retention_secs` ago, from
    /// the store first and then from memory.
    pub fn purge_terminal(&self) -> QueueResult<Vec<SignalId>> {
        let now = self.clock.now_ms();
        let retention = self.config.retention_ms();
        let mut signals = self.signals.lock();
        let aged: Vec<SignalId> = signals
            .values()
            .filter(|s| {
                // Records written before finish times were kept age from queueing
                let finished = s.finished_at_ms.unwrap_or(s.queued_at_ms);
                s.status.is_terminal() && now.saturating_sub(finished) >= retention
            })
            .map(|s| s.id.clone())
            .collect();
        if aged.is_empty() {
            return Ok(aged);
        }

        self.store.remove(&aged)?;
        for id in &aged {
            signals.remove(id);
        }
        debug!(purged = aged.len(), remaining = signals.len(), "Purged terminal signals");
        Ok(aged)
    }

    fn requeue_executing(
        &self,
        select: impl Fn(&Signal) -> bool,
        reason: &str,
    ) -> QueueResult<Vec<SignalId>> {
        let now = self.clock.now_ms();
        let mut signals = self.signals.lock();
        let stale: Vec<SignalId> = signals
            .values()
            .filter(|s| s.status == SignalStatus::Executing && select(s))
            .map(|s| s.id.clone())
            .collect();

        for id in &stale {
            self.transition(&mut signals, id, SignalStatus::Pending, |s| {
                s.claimed_at_ms = None;
                s.claim_token += 1;
                s.scheduled_at_ms = now;
                s.needs_reconcile = true;
                s.last_error = Some(reason.to_string());
            })?;
            warn!(signal_id = %id, reason, "Signal reclaimed");
        }
        Ok(stale)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn get(&self, id: &SignalId) -> Option<Signal> {
        self.signals.lock().get(id).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let signals = self.signals.lock();
        let mut stats = QueueStats::default();
        for signal in signals.values() {
            stats.record(signal.status);
        }
        stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.lock().is_empty()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Confirm `claimed` is still the live claim on an EXECUTING record.
    /// Returns the record's retry count.
    fn check_claim(
        signals: &HashMap<SignalId, Signal>,
        claimed: &Signal,
        to: SignalStatus,
    ) -> QueueResult<u32> {
        let current = signals
            .get(&claimed.id)
            .ok_or_else(|| QueueError::NotFound(claimed.id.clone()))?;
        if current.claim_token != claimed.claim_token {
            return Err(QueueError::StaleClaim {
                id: claimed.id.clone(),
                held: claimed.claim_token,
                current: current.claim_token,
            });
        }
        if current.status != SignalStatus::Executing {
            return Err(QueueError::InvalidTransition {
                id: claimed.id.clone(),
                from: current.status,
                to,
            });
        }
        Ok(current.retry_count)
    }

    /// Validate `current -> to`, persist the mutated copy, then commit it.
    /// The record is left untouched if either step fails.
    fn transition(
        &self,
        signals: &mut HashMap<SignalId, Signal>,
        id: &SignalId,
        to: SignalStatus,
        mutate: impl FnOnce(&mut Signal),
    ) -> QueueResult<Signal> {
        let current = signals
            .get(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        if !current.status.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                id: id.clone(),
                from: current.status,
                to,
            });
        }

        let mut next = current.clone();
        next.status = to;
        mutate(&mut next);
        if to.is_terminal() {
            next.finished_at_ms = Some(self.clock.now_ms());
        }
        self.store.put(&next)?;

        signals.insert(id.clone(), next.clone());
        Metrics::signal_transition(to.as_str());
        Ok(next)
    }
}

impl std::fmt::Debug for SignalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalQueue")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
