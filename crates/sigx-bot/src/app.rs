//! Application context.
//!
//! Built once from `AppConfig`: opens the durable stores, rebuilds the queue,
//! creates one risk gate and executor per account and hands them to the
//! worker pools. Owns the cancellation token used for graceful shutdown.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sigx_core::{AccountId, Clock, IncomingSignal, SignalId, SystemClock};
use sigx_executor::{DynBrokerage, ExitPolicy, PaperBrokerage, SignalExecutor};
use sigx_persistence::{RiskStateFile, SignalJournal};
use sigx_queue::{MemorySignalStore, SignalQueue, SignalStore};
use sigx_risk::{
    AlertSink, LogAlertSink, MemoryRiskStateStore, RiskGate, RiskGateRegistry, RiskStateStore,
};

use crate::config::{AccountConfig, AppConfig};
use crate::error::{AppError, AppResult};
use crate::outcome::{JsonlOutcomeSink, OutcomeSink, OutcomeTracker};
use crate::worker::{run_sweeper, sweep_once, Worker};

/// Per-account runtime components.
struct AccountRuntime {
    config: AccountConfig,
    gate: Arc<RiskGate>,
    executor: Arc<SignalExecutor>,
}

pub struct Application {
    config: AppConfig,
    queue: Arc<SignalQueue>,
    registry: Arc<RiskGateRegistry>,
    accounts: Vec<AccountRuntime>,
    tracker: Arc<OutcomeTracker>,
    outcome_file: Option<Arc<JsonlOutcomeSink>>,
    cancel: CancellationToken,
}

impl Application {
    /// Build the application with paper brokerages and the system clock.
    pub async fn init(config: AppConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let exit_policy = ExitPolicy::new(config.executor.min_holding_bars);
        let brokers = config
            .accounts
            .iter()
            .map(|account| {
                let broker: DynBrokerage = Arc::new(PaperBrokerage::new(
                    account.starting_cash,
                    exit_policy,
                    Arc::clone(&clock),
                ));
                (account.id.clone(), broker)
            })
            .collect();
        Self::init_with(config, clock, brokers, Arc::new(LogAlertSink)).await
    }

    /// Build the application with explicit collaborators.
    ///
    /// Every configured account needs an entry in `brokers`.
    pub async fn init_with(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        mut brokers: HashMap<AccountId, DynBrokerage>,
        alerts: Arc<dyn AlertSink>,
    ) -> AppResult<Self> {
        config.validate()?;

        let persistence = &config.persistence;
        let (signal_store, risk_store, outcome_file): (
            Arc<dyn SignalStore>,
            Arc<dyn RiskStateStore>,
            Option<Arc<JsonlOutcomeSink>>,
        ) = if persistence.enabled {
            let dir = &persistence.data_dir;
            let journal =
                SignalJournal::open(dir)?.with_compact_threshold(persistence.compact_threshold);
            journal.compact()?;
            (
                Arc::new(journal),
                Arc::new(RiskStateFile::open(dir)?),
                Some(Arc::new(JsonlOutcomeSink::new(
                    dir.join("outcomes"),
                    persistence.buffer_size,
                ))),
            )
        } else {
            warn!("Persistence disabled, queue and risk state are in memory only");
            (
                Arc::new(MemorySignalStore::new()),
                Arc::new(MemoryRiskStateStore::new()),
                None,
            )
        };

        let queue = Arc::new(SignalQueue::open(
            signal_store,
            config.queue.clone(),
            Arc::clone(&clock),
        )?);
        let registry = Arc::new(RiskGateRegistry::new(
            config.risk.clone(),
            risk_store,
            Arc::clone(&alerts),
            Arc::clone(&clock),
        )?);

        let mut tracker = OutcomeTracker::new(Arc::clone(&queue), alerts, Arc::clone(&clock));
        if let Some(sink) = &outcome_file {
            tracker = tracker.with_sink(Arc::clone(sink) as Arc<dyn OutcomeSink>);
        }

        let instruments = Arc::new(config.instrument_registry());
        let mut accounts = Vec::with_capacity(config.accounts.len());
        for account in &config.accounts {
            let broker = brokers.remove(&account.id).ok_or_else(|| {
                AppError::Config(format!("no brokerage for account {}", account.id))
            })?;
            let executor = Arc::new(SignalExecutor::new(
                broker,
                Arc::clone(&instruments),
                config.executor.clone(),
                Arc::clone(&clock),
            ));

            let (snapshot, positions) = executor.account_state().await?;
            let gate = registry.get_or_create(&account.id, snapshot)?;
            gate.refresh(snapshot, positions);
            info!(
                account = %account.id,
                workers = account.workers,
                equity = %snapshot.equity,
                halted = gate.is_halted(),
                "Account ready"
            );

            accounts.push(AccountRuntime {
                config: account.clone(),
                gate,
                executor,
            });
        }

        Ok(Self {
            config,
            queue,
            registry,
            accounts,
            tracker: Arc::new(tracker),
            outcome_file,
            cancel: CancellationToken::new(),
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<SignalQueue> {
        &self.queue
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RiskGateRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn gate(&self, account: &AccountId) -> Option<Arc<RiskGate>> {
        self.registry.get(account)
    }

    /// Token that stops every worker and the sweeper when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------------

    /// Enqueue one upstream signal. Its account must be configured.
    pub fn enqueue(&self, incoming: IncomingSignal) -> AppResult<SignalId> {
        let account = incoming
            .account_id
            .clone()
            .unwrap_or_else(|| AccountId::from(self.config.queue.default_account.as_str()));
        if !self.accounts.iter().any(|a| a.config.id == account) {
            return Err(AppError::UnknownAccount(account));
        }
        Ok(self.queue.enqueue(incoming)?)
    }

    /// Enqueue every signal in a JSON Lines file. Lines that fail to parse
    /// or validate are logged and skipped. Returns the number accepted.
    pub fn enqueue_file(&self, path: impl AsRef<Path>) -> AppResult<usize> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut accepted = 0usize;
        let mut skipped = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let result = serde_json::from_str::<IncomingSignal>(&line)
                .map_err(|e| e.to_string())
                .and_then(|incoming| self.enqueue(incoming).map_err(|e| e.to_string()));
            match result {
                Ok(_) => accepted += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(line = idx + 1, error = %e, "Skipping signal");
                }
            }
        }

        info!(path = %path.display(), accepted, skipped, "Signals loaded");
        Ok(accepted)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn worker(&self, account: &AccountRuntime, id: usize) -> Worker {
        Worker::new(
            id,
            account.config.id.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&account.gate),
            Arc::clone(&account.executor),
            Arc::clone(&self.tracker),
            self.config.workers.poll_interval(),
        )
    }

    /// Process every signal that is due now, then return.
    ///
    /// Retries scheduled in the future stay queued.
    pub async fn drain(&self) -> AppResult<usize> {
        let mut processed = 0usize;
        loop {
            sweep_once(&self.queue)?;
            let mut progressed = false;
            for account in &self.accounts {
                let worker = self.worker(account, 0);
                while worker.run_once().await? {
                    processed += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(processed)
    }

    /// Run the sweeper and worker pools until Ctrl-C or cancellation, then
    /// shut down.
    pub async fn run(self) -> AppResult<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        handles.push(tokio::spawn(run_sweeper(
            Arc::clone(&self.queue),
            std::time::Duration::from_millis(self.config.queue.sweep_interval_ms),
            self.cancel.clone(),
        )));
        for account in &self.accounts {
            for id in 0..account.config.workers {
                let worker = self.worker(account, id);
                handles.push(tokio::spawn(worker.run(self.cancel.clone())));
            }
        }
        info!(tasks = handles.len(), "Application running");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            _ = self.cancel.cancelled() => info!("Cancellation requested"),
        }
        self.cancel.cancel();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(?e, "Task failed during shutdown");
            }
        }
        self.shutdown()
    }

    /// Flush outcome records and log final state.
    pub fn shutdown(&self) -> AppResult<()> {
        self.cancel.cancel();
        if let Some(sink) = &self.outcome_file {
            sink.close()?;
        }

        let stats = self.queue.stats();
        info!(
            pending = stats.pending,
            ready = stats.ready,
            executing = stats.executing,
            executed = stats.executed,
            failed = stats.failed,
            expired = stats.expired,
            cancelled = stats.cancelled,
            "Shutdown complete"
        );
        for account in &self.accounts {
            let view = account.gate.view();
            info!(account = %account.config.id, ?view, "Final risk state");
        }
        Ok(())
    }
}
