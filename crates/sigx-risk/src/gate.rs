//! Per-account risk admission gate.
//!
//! All mutable state of one account sits behind one `parking_lot::Mutex`, so
//! an admission check never observes a half-applied fill. Accounts share no
//! lock. Alerts are collected under the lock and published after it is
//! released.
//!
//! Check order in `can_admit`:
//! 1. Session rollover (clears the halt, re-arms alert tiers)
//! 2. Halted
//! 3. Confidence
//! 4. Max positions (only for a signal opening a new symbol)
//! 5. Position size (headroom left under the per-symbol notional cap)
//! 6. Correlation ceiling
//!
//! A signal opposite to an open position is a close and skips 4-6.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use sigx_core::{
    session_start_ms, AccountId, AccountSnapshot, Clock, Position, PositionDelta, PositionSide,
    Signal,
};
use sigx_telemetry::Metrics;

use crate::alert::{AlertEvent, AlertMetric, AlertSeverity, AlertSink};
use crate::correlation::{CorrelationEstimator, GroupCorrelation, NoCorrelation};
use crate::error::RiskResult;
use crate::halt::{HaltLatch, HaltReason};
use crate::limits::{RiskConfig, RiskLimits};
use crate::state::{ResumeLevels, RiskStateRecord, RiskStateStore};

const EQUITY_CURVE_CAPACITY: usize = 1_024;

// ============================================================================
// Decisions
// ============================================================================

/// Why a signal was blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    LowConfidence {
        confidence: Decimal,
        min: Decimal,
    },
    MaxPositions {
        open: usize,
        max: usize,
    },
    PositionSize {
        exposure: Decimal,
        limit: Decimal,
    },
    Correlation {
        coefficient: Decimal,
        ceiling: Decimal,
    },
    NoEquity,
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence { confidence, min } => {
                write!(f, "Confidence {} below minimum {}", confidence, min)
            }
            Self::MaxPositions { open, max } => {
                write!(f, "Open positions {} at maximum {}", open, max)
            }
            Self::PositionSize { exposure, limit } => write!(
                f,
                "Exposure {} leaves no headroom under position limit {}",
                exposure.round_dp(2),
                limit.round_dp(2)
            ),
            Self::Correlation {
                coefficient,
                ceiling,
            } => write!(
                f,
                "Correlation {} with open positions exceeds ceiling {}",
                coefficient, ceiling
            ),
            Self::NoEquity => write!(f, "Account has no equity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allow,
    Block(RiskRejection),
    /// Account is halted; carries the halt reason.
    Halt(String),
}

impl AdmissionDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Human-readable reason for a non-allow decision.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Block(rejection) => Some(rejection.to_string()),
            Self::Halt(reason) => Some(format!("Trading halted: {}", reason)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block(_) => "block",
            Self::Halt(_) => "halt",
        }
    }
}

// ============================================================================
// RiskView
// ============================================================================

/// Point-in-time copy of a gate's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskView {
    pub account_id: AccountId,
    pub equity: Decimal,
    pub peak_equity: Decimal,
    pub session_start_equity: Decimal,
    pub session_start_ms: u64,
    pub daily_pnl: Decimal,
    pub drawdown_pct: Decimal,
    pub daily_loss_pct: Decimal,
    pub open_positions: usize,
    pub halted: bool,
    pub halt_reason: Option<String>,
}

// ============================================================================
// GateState
// ============================================================================

#[derive(Debug)]
struct GateState {
    equity: Decimal,
    peak_equity: Decimal,
    session_start_equity: Decimal,
    session_start_ms: u64,
    daily_pnl: Decimal,
    snapshot: AccountSnapshot,
    positions: HashMap<String, Position>,
    equity_curve: VecDeque<(u64, Decimal)>,
    /// Alert tiers already raised this session.
    fired: HashSet<(AlertMetric, AlertSeverity)>,
    /// Set by an operator resume, cleared at the session boundary.
    resume_levels: Option<ResumeLevels>,
}

impl GateState {
    fn new(snapshot: AccountSnapshot, session_start_ms: u64) -> Self {
        Self {
            equity: snapshot.equity,
            peak_equity: snapshot.equity.max(snapshot.peak_equity),
            session_start_equity: snapshot.equity,
            session_start_ms,
            daily_pnl: Decimal::ZERO,
            snapshot,
            positions: HashMap::new(),
            equity_curve: VecDeque::with_capacity(EQUITY_CURVE_CAPACITY),
            fired: HashSet::new(),
            resume_levels: None,
        }
    }

    fn drawdown_pct(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity) / self.peak_equity * Decimal::ONE_HUNDRED)
            .max(Decimal::ZERO)
    }

    fn daily_loss_pct(&self) -> Decimal {
        if self.session_start_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (-self.daily_pnl / self.session_start_equity * Decimal::ONE_HUNDRED).max(Decimal::ZERO)
    }
}

// ============================================================================
// RiskGate
// ============================================================================

pub struct RiskGate {
    account: AccountId,
    limits: RiskLimits,
    reset_hour: u32,
    state: Mutex<GateState>,
    halt: HaltLatch,
    correlation: Arc<dyn CorrelationEstimator>,
    store: Arc<dyn RiskStateStore>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl RiskGate {
    /// Create the gate for `account`, restoring persisted state when it
    /// belongs to the current session.
    pub fn open(
        account: AccountId,
        config: &RiskConfig,
        snapshot: AccountSnapshot,
        store: Arc<dyn RiskStateStore>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> RiskResult<Self> {
        config.validate()?;
        let now = clock.now_ms();
        let session_start = session_start_ms(now, config.session_reset_hour);
        let mut state = GateState::new(snapshot, session_start);
        let halt = HaltLatch::new();

        if let Some(record) = store.load(&account)? {
            if record.daily_pnl_reset_at_ms >= session_start {
                state.peak_equity = state.peak_equity.max(record.peak_equity);
                state.session_start_equity = record.session_start_equity;
                state.daily_pnl = state.equity - record.session_start_equity;
                state.resume_levels = record.resume_levels;
                if record.halted {
                    halt.trigger(
                        HaltReason::Restored {
                            message: record
                                .halt_reason
                                .unwrap_or_else(|| "restored halt".to_string()),
                        },
                        now,
                    );
                }
                info!(
                    account = %account,
                    peak_equity = %state.peak_equity,
                    halted = record.halted,
                    "Risk state restored"
                );
            } else {
                info!(account = %account, "Persisted risk state is from an earlier session");
            }
        }

        let correlation: Arc<dyn CorrelationEstimator> = if config.correlation_groups.is_empty() {
            Arc::new(NoCorrelation)
        } else {
            Arc::new(GroupCorrelation::new(&config.correlation_groups))
        };

        let gate = Self {
            account,
            limits: config.limits.clone(),
            reset_hour: config.session_reset_hour,
            state: Mutex::new(state),
            halt,
            correlation,
            store,
            alerts,
            clock,
        };
        {
            let state = gate.state.lock();
            gate.store.save(&gate.record(&state))?;
        }
        Metrics::gate_halted(gate.account.as_str(), gate.halt.is_triggered());
        Ok(gate)
    }

    /// Replace the correlation estimator.
    #[must_use]
    pub fn with_correlation(mut self, estimator: Arc<dyn CorrelationEstimator>) -> Self {
        self.correlation = estimator;
        self
    }

    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    #[must_use]
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halt.is_triggered()
    }

    #[must_use]
    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt.reason()
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Decide whether `signal` may be executed.
    pub fn can_admit(&self, signal: &Signal) -> AdmissionDecision {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();
        let decision = {
            let mut state = self.state.lock();
            self.roll_session(&mut state, now, &mut alerts);
            self.evaluate(&state, signal)
        };
        self.publish(&alerts);

        Metrics::gate_decision(decision.label());
        match &decision {
            AdmissionDecision::Allow => debug!(
                account = %self.account,
                signal_id = %signal.id,
                symbol = %signal.symbol,
                "Signal admitted"
            ),
            AdmissionDecision::Block(rejection) => info!(
                account = %self.account,
                signal_id = %signal.id,
                symbol = %signal.symbol,
                reason = %rejection,
                "Signal blocked"
            ),
            AdmissionDecision::Halt(reason) => warn!(
                account = %self.account,
                signal_id = %signal.id,
                reason = %reason,
                "Signal rejected, account halted"
            ),
        }
        decision
    }

    fn evaluate(&self, state: &GateState, signal: &Signal) -> AdmissionDecision {
        if self.halt.is_triggered() {
            let reason = self
                .halt
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "halted".to_string());
            return AdmissionDecision::Halt(reason);
        }

        if signal.confidence < self.limits.min_confidence {
            return AdmissionDecision::Block(RiskRejection::LowConfidence {
                confidence: signal.confidence,
                min: self.limits.min_confidence,
            });
        }

        let existing = state.positions.get(&signal.symbol);
        if existing.is_some_and(|p| p.is_closed_by(signal.action)) {
            return AdmissionDecision::Allow;
        }

        if existing.is_none() && state.positions.len() >= self.limits.max_positions {
            return AdmissionDecision::Block(RiskRejection::MaxPositions {
                open: state.positions.len(),
                max: self.limits.max_positions,
            });
        }

        if state.equity <= Decimal::ZERO {
            return AdmissionDecision::Block(RiskRejection::NoEquity);
        }
        let limit = self.limits.position_notional(state.equity);
        let exposure = existing.map(Position::notional).unwrap_or(Decimal::ZERO);
        // An entry is sized to the headroom, so only a full symbol is blocked
        if exposure >= limit {
            return AdmissionDecision::Block(RiskRejection::PositionSize { exposure, limit });
        }

        let others: Vec<Position> = state
            .positions
            .values()
            .filter(|p| p.symbol != signal.symbol)
            .cloned()
            .collect();
        let coefficient = self.correlation.correlation(
            &signal.symbol,
            PositionSide::from(signal.action),
            &others,
        );
        if coefficient > self.limits.correlation_ceiling {
            return AdmissionDecision::Block(RiskRejection::Correlation {
                coefficient,
                ceiling: self.limits.correlation_ceiling,
            });
        }

        AdmissionDecision::Allow
    }

    // ------------------------------------------------------------------------
    // State updates
    // ------------------------------------------------------------------------

    /// Apply one execution's effect: equity, daily P&L, peak, drawdown,
    /// positions. Then evaluate alert tiers and the breaker.
    pub fn apply_fill(&self, delta: &PositionDelta) -> Vec<AlertEvent> {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();
        {
            let mut state = self.state.lock();
            self.roll_session(&mut state, now, &mut alerts);

            state.equity += delta.realized_pnl;
            state.daily_pnl += delta.realized_pnl;
            match &delta.position_after {
                Some(position) => {
                    state
                        .positions
                        .insert(delta.symbol.clone(), position.clone());
                }
                None => {
                    state.positions.remove(&delta.symbol);
                }
            }
            debug!(
                account = %self.account,
                symbol = %delta.symbol,
                realized_pnl = %delta.realized_pnl,
                equity = %state.equity,
                daily_pnl = %state.daily_pnl,
                "Fill applied"
            );
            self.record_equity(&mut state, now, &mut alerts);
        }
        self.publish(&alerts);
        alerts
    }

    /// Replace the cached account and position view with fresh brokerage
    /// state.
    pub fn refresh(&self, snapshot: AccountSnapshot, positions: Vec<Position>) -> Vec<AlertEvent> {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();
        {
            let mut state = self.state.lock();
            self.roll_session(&mut state, now, &mut alerts);

            state.snapshot = snapshot;
            state.equity = snapshot.equity;
            state.daily_pnl = snapshot.equity - state.session_start_equity;
            state.positions = positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect();
            self.record_equity(&mut state, now, &mut alerts);
        }
        self.publish(&alerts);
        alerts
    }

    /// Operator resume: OPEN -> CLOSED. Returns `false` if not halted.
    ///
    /// The drawdown and daily loss at this moment become the new trip
    /// levels for the rest of the session: the account halts again only if
    /// either gets worse.
    pub fn resume(&self, operator_note: &str) -> bool {
        let now = self.clock.now_ms();
        {
            let mut state = self.state.lock();
            if !self.halt.reset() {
                return false;
            }
            let levels = ResumeLevels {
                drawdown_pct: state.drawdown_pct(),
                daily_loss_pct: state.daily_loss_pct(),
            };
            info!(
                account = %self.account,
                drawdown_pct = %levels.drawdown_pct.round_dp(2),
                daily_loss_pct = %levels.daily_loss_pct.round_dp(2),
                note = operator_note,
                "Trading resumed by operator"
            );
            state.resume_levels = Some(levels);
            self.save(&state);
        }
        Metrics::gate_halted(self.account.as_str(), false);
        let alert = AlertEvent::new(
            self.account.clone(),
            AlertSeverity::Info,
            AlertMetric::Breaker,
            format!("Trading resumed: {}", operator_note),
            now,
        );
        self.publish(std::slice::from_ref(&alert));
        true
    }

    /// Operator halt. Returns `false` if already halted.
    pub fn halt(&self, message: &str) -> bool {
        let now = self.clock.now_ms();
        let reason = HaltReason::Manual {
            message: message.to_string(),
        };
        {
            let state = self.state.lock();
            if !self.halt.trigger(reason.clone(), now) {
                return false;
            }
            self.save(&state);
        }
        Metrics::gate_halted(self.account.as_str(), true);
        let alert = AlertEvent::new(
            self.account.clone(),
            AlertSeverity::Breach,
            AlertMetric::Breaker,
            format!("Trading halted: {}", reason),
            now,
        );
        self.publish(std::slice::from_ref(&alert));
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn view(&self) -> RiskView {
        let state = self.state.lock();
        RiskView {
            account_id: self.account.clone(),
            equity: state.equity,
            peak_equity: state.peak_equity,
            session_start_equity: state.session_start_equity,
            session_start_ms: state.session_start_ms,
            daily_pnl: state.daily_pnl,
            drawdown_pct: state.drawdown_pct(),
            daily_loss_pct: state.daily_loss_pct(),
            open_positions: state.positions.len(),
            halted: self.halt.is_triggered(),
            halt_reason: self.halt.reason().map(|r| r.to_string()),
        }
    }

    /// Last brokerage snapshot with the gate's peak equity.
    #[must_use]
    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock();
        AccountSnapshot {
            equity: state.equity,
            peak_equity: state.peak_equity,
            ..state.snapshot
        }
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.state.lock().positions.values().cloned().collect()
    }

    #[must_use]
    pub fn equity_curve(&self) -> Vec<(u64, Decimal)> {
        self.state.lock().equity_curve.iter().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn roll_session(&self, state: &mut GateState, now: u64, alerts: &mut Vec<AlertEvent>) {
        let start = session_start_ms(now, self.reset_hour);
        if start <= state.session_start_ms {
            return;
        }

        state.session_start_ms = start;
        state.session_start_equity = state.equity;
        state.peak_equity = state.equity;
        state.daily_pnl = Decimal::ZERO;
        state.fired.clear();
        state.resume_levels = None;
        let was_halted = self.halt.reset();
        self.save(state);
        Metrics::gate_halted(self.account.as_str(), false);

        info!(
            account = %self.account,
            session_start_ms = start,
            equity = %state.equity,
            was_halted,
            "Risk session reset"
        );
        if was_halted {
            alerts.push(AlertEvent::new(
                self.account.clone(),
                AlertSeverity::Info,
                AlertMetric::Breaker,
                "Halt cleared at session boundary",
                now,
            ));
        }
    }

    fn record_equity(&self, state: &mut GateState, now: u64, alerts: &mut Vec<AlertEvent>) {
        if state.equity_curve.len() == EQUITY_CURVE_CAPACITY {
            state.equity_curve.pop_front();
        }
        state.equity_curve.push_back((now, state.equity));

        let mut dirty = false;
        if state.equity > state.peak_equity {
            state.peak_equity = state.equity;
            dirty = true;
        }

        let drawdown = state.drawdown_pct();
        let daily_loss = state.daily_loss_pct();
        Metrics::drawdown_pct(self.account.as_str(), drawdown.to_f64().unwrap_or(0.0));

        let mut breach: Option<HaltReason> = None;
        for (metric, value, limit) in [
            (AlertMetric::Drawdown, drawdown, self.limits.max_drawdown_pct),
            (
                AlertMetric::DailyLoss,
                daily_loss,
                self.limits.daily_loss_limit_pct,
            ),
        ] {
            let Some(tier) = AlertSeverity::tier_for(value / limit) else {
                continue;
            };
            // Lower tiers are marked silently when a jump skips them.
            for lower in tier.tiers_up_to().filter(|t| *t < tier) {
                state.fired.insert((metric, lower));
            }
            if state.fired.insert((metric, tier)) {
                alerts.push(
                    AlertEvent::new(
                        self.account.clone(),
                        tier,
                        metric,
                        format!(
                            "{} {}% reached {}% of limit {}%",
                            metric,
                            value.round_dp(2),
                            (value / limit * Decimal::ONE_HUNDRED).round_dp(0),
                            limit
                        ),
                        now,
                    )
                    .with_metric("value_pct", value.round_dp(4))
                    .with_metric("limit_pct", limit)
                    .with_metric("equity", state.equity)
                    .with_metric("peak_equity", state.peak_equity),
                );
            }
            let past_resume = state
                .resume_levels
                .map_or(true, |levels| levels.exceeded_by(metric, value));
            if tier == AlertSeverity::Breach && breach.is_none() && past_resume {
                breach = Some(match metric {
                    AlertMetric::Drawdown => HaltReason::MaxDrawdown {
                        drawdown_pct: value,
                        limit_pct: limit,
                    },
                    _ => HaltReason::DailyLossLimit {
                        loss_pct: value,
                        limit_pct: limit,
                    },
                });
            }
        }

        if let Some(reason) = breach {
            if self.halt.trigger(reason.clone(), now) {
                dirty = true;
                Metrics::gate_halted(self.account.as_str(), true);
                alerts.push(
                    AlertEvent::new(
                        self.account.clone(),
                        AlertSeverity::Breach,
                        AlertMetric::Breaker,
                        format!("Trading halted: {}", reason),
                        now,
                    )
                    .with_metric("drawdown_pct", drawdown.round_dp(4))
                    .with_metric("daily_loss_pct", daily_loss.round_dp(4)),
                );
            }
        }

        if dirty {
            self.save(state);
        }
    }

    fn record(&self, state: &GateState) -> RiskStateRecord {
        RiskStateRecord {
            account_id: self.account.clone(),
            peak_equity: state.peak_equity,
            halted: self.halt.is_triggered(),
            halt_reason: self.halt.reason().map(|r| r.to_string()),
            daily_pnl_reset_at_ms: state.session_start_ms,
            session_start_equity: state.session_start_equity,
            resume_levels: state.resume_levels,
        }
    }

    fn save(&self, state: &GateState) {
        if let Err(e) = self.store.save(&self.record(state)) {
            error!(account = %self.account, error = %e, "Failed to persist risk state");
        }
    }

    fn publish(&self, alerts: &[AlertEvent]) {
        for alert in alerts {
            self.alerts.publish(alert);
        }
    }
}

impl fmt::Debug for RiskGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskGate")
            .field("account", &self.account)
            .field("limits", &self.limits)
            .field("halted", &self.halt.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;
    use crate::correlation::CorrelationGroup;
    use crate::state::MemoryRiskStateStore;
    use rust_decimal_macros::dec;
    use sigx_core::{IncomingSignal, ManualClock, Price, Quantity, Side};

    /// 2023-11-14 22:13:20 UTC
    const T0: u64 = 1_700_000_000_000;
    const DAY_MS: u64 = 86_400_000;

    struct Fixture {
        gate: RiskGate,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryAlertSink>,
        store: Arc<MemoryRiskStateStore>,
    }

    fn fixture(config: RiskConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let sink = Arc::new(MemoryAlertSink::new());
        let store = Arc::new(MemoryRiskStateStore::new());
        let gate = RiskGate::open(
            AccountId::from("acct"),
            &config,
            AccountSnapshot::flat(dec!(100000)),
            store.clone(),
            sink.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            gate,
            clock,
            sink,
            store,
        }
    }

    fn signal(symbol: &str, action: Side, confidence: Decimal) -> Signal {
        Signal::from_incoming(
            IncomingSignal {
                id: None,
                account_id: None,
                symbol: symbol.to_string(),
                timestamp_ms: T0,
                action,
                confidence,
                entry_price: Price::new(dec!(100)),
                stop_price: None,
                target_price: None,
                regime: None,
                priority: 0,
                expires_at_ms: None,
            },
            &AccountId::from("acct"),
            T0,
            60_000,
        )
        .unwrap()
    }

    fn long(symbol: &str, qty: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            quantity: Quantity::new(qty),
            entry_price: Price::new(dec!(100)),
            opened_at_ms: T0,
        }
    }

    fn loss(amount: Decimal) -> PositionDelta {
        PositionDelta {
            symbol: "AAPL".to_string(),
            realized_pnl: amount,
            position_after: None,
        }
    }

    #[test]
    fn test_low_confidence_blocked() {
        let f = fixture(RiskConfig::default());
        let decision = f.gate.can_admit(&signal("AAPL", Side::Buy, dec!(59)));
        assert!(matches!(
            decision,
            AdmissionDecision::Block(RiskRejection::LowConfidence { .. })
        ));
        assert!(decision.reason().unwrap().contains("below minimum"));
        assert!(f.gate.can_admit(&signal("AAPL", Side::Buy, dec!(60))).is_allowed());
    }

    #[test]
    fn test_daily_loss_breaker_halts_until_session_reset() {
        let f = fixture(RiskConfig::default());

        f.gate.apply_fill(&loss(dec!(-2000)));
        assert!(!f.gate.is_halted());
        f.gate.apply_fill(&loss(dec!(-3100)));
        assert!(f.gate.is_halted());
        assert_eq!(f.gate.view().daily_loss_pct, dec!(5.1));

        let decision = f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(99)));
        assert!(matches!(decision, AdmissionDecision::Halt(_)));

        // Sticky within the session.
        f.clock.advance(60_000);
        assert!(!f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(99))).is_allowed());

        let stored = f.store.load(&AccountId::from("acct")).unwrap().unwrap();
        assert!(stored.halted);

        f.clock.advance(DAY_MS);
        assert!(f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(99))).is_allowed());
        let view = f.gate.view();
        assert!(!view.halted);
        assert_eq!(view.daily_pnl, Decimal::ZERO);
        assert_eq!(view.session_start_equity, dec!(94900));
    }

    #[test]
    fn test_alert_tiers_fire_once_per_session() {
        let f = fixture(RiskConfig::default());

        f.gate.apply_fill(&loss(dec!(-3600)));
        f.gate.apply_fill(&loss(dec!(-100)));
        f.gate.apply_fill(&loss(dec!(-900)));
        f.gate.apply_fill(&loss(dec!(-500)));
        f.gate.apply_fill(&loss(dec!(-100)));

        let daily: Vec<AlertSeverity> = f
            .sink
            .alerts()
            .iter()
            .filter(|a| a.metric == AlertMetric::DailyLoss)
            .map(|a| a.severity)
            .collect();
        assert_eq!(
            daily,
            vec![
                AlertSeverity::Warning,
                AlertSeverity::Critical,
                AlertSeverity::Breach
            ]
        );
        let breaker = f
            .sink
            .alerts()
            .iter()
            .filter(|a| a.metric == AlertMetric::Breaker)
            .count();
        assert_eq!(breaker, 1);
    }

    #[test]
    fn test_drawdown_breaker_uses_peak() {
        let config = RiskConfig {
            limits: RiskLimits {
                max_drawdown_pct: dec!(3),
                daily_loss_limit_pct: dec!(50),
                ..RiskLimits::default()
            },
            ..RiskConfig::default()
        };
        let f = fixture(config);

        f.gate.apply_fill(&loss(dec!(10000)));
        assert_eq!(f.gate.view().peak_equity, dec!(110000));
        f.gate.apply_fill(&loss(dec!(-3300)));
        assert!(f.gate.is_halted());
        assert!(matches!(
            f.gate.halt_reason(),
            Some(HaltReason::MaxDrawdown { .. })
        ));
        // Daily P&L is still positive.
        assert_eq!(f.gate.view().daily_pnl, dec!(6700));
    }

    #[test]
    fn test_peak_never_decreases_within_session() {
        let f = fixture(RiskConfig::default());
        f.gate.refresh(AccountSnapshot::flat(dec!(101000)), vec![]);
        f.gate.refresh(AccountSnapshot::flat(dec!(99000)), vec![]);
        assert_eq!(f.gate.view().peak_equity, dec!(101000));
        assert_eq!(f.gate.snapshot().peak_equity, dec!(101000));
    }

    #[test]
    fn test_resume_clears_halt() {
        let f = fixture(RiskConfig::default());
        assert!(!f.gate.resume("nothing to do"));
        f.gate.halt("ops");
        assert!(f.gate.is_halted());
        assert!(f.gate.resume("checked"));
        assert!(!f.gate.is_halted());
        assert!(f.gate.can_admit(&signal("AAPL", Side::Buy, dec!(90))).is_allowed());
        assert_eq!(f.sink.count(AlertSeverity::Info), 1);
    }

    #[test]
    fn test_resume_holds_until_loss_worsens() {
        let f = fixture(RiskConfig::default());
        f.gate.apply_fill(&loss(dec!(-5100)));
        assert!(f.gate.is_halted());

        assert!(f.gate.resume("operator reviewed"));
        // Same loss seen again through the brokerage
        f.gate.refresh(AccountSnapshot::flat(dec!(94900)), vec![]);
        assert!(!f.gate.is_halted());
        assert!(f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(99))).is_allowed());

        let stored = f.store.load(&AccountId::from("acct")).unwrap().unwrap();
        assert_eq!(
            stored.resume_levels.map(|l| l.daily_loss_pct),
            Some(dec!(5.1))
        );

        f.gate.apply_fill(&loss(dec!(-100)));
        assert!(f.gate.is_halted());
    }

    #[test]
    fn test_resume_levels_survive_reopen() {
        let f = fixture(RiskConfig::default());
        f.gate.apply_fill(&loss(dec!(-5100)));
        f.gate.resume("operator reviewed");

        let reopened = RiskGate::open(
            AccountId::from("acct"),
            &RiskConfig::default(),
            AccountSnapshot::flat(dec!(94900)),
            f.store.clone(),
            f.sink.clone(),
            f.clock.clone(),
        )
        .unwrap();
        reopened.refresh(AccountSnapshot::flat(dec!(94900)), vec![]);
        assert!(!reopened.is_halted());

        // Next session starts clean
        f.clock.advance(DAY_MS);
        reopened.refresh(AccountSnapshot::flat(dec!(94900)), vec![]);
        let stored = f.store.load(&AccountId::from("acct")).unwrap().unwrap();
        assert!(stored.resume_levels.is_none());
    }

    #[test]
    fn test_position_limits_and_closing_bypass() {
        let config = RiskConfig {
            limits: RiskLimits {
                max_positions: 1,
                ..RiskLimits::default()
            },
            ..RiskConfig::default()
        };
        let f = fixture(config);
        f.gate.refresh(
            AccountSnapshot::flat(dec!(100000)),
            vec![long("AAPL", dec!(50))],
        );

        assert!(matches!(
            f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(90))),
            AdmissionDecision::Block(RiskRejection::MaxPositions { open: 1, max: 1 })
        ));
        // 5000 of a 10000 cap leaves room for an addition
        assert!(f.gate.can_admit(&signal("AAPL", Side::Buy, dec!(90))).is_allowed());
        assert!(f.gate.can_admit(&signal("AAPL", Side::Sell, dec!(90))).is_allowed());

        f.gate.refresh(
            AccountSnapshot::flat(dec!(100000)),
            vec![long("AAPL", dec!(100))],
        );
        let decision = f.gate.can_admit(&signal("AAPL", Side::Buy, dec!(90)));
        assert_eq!(
            decision,
            AdmissionDecision::Block(RiskRejection::PositionSize {
                exposure: dec!(10000),
                limit: dec!(10000),
            })
        );
        assert!(f.gate.can_admit(&signal("AAPL", Side::Sell, dec!(90))).is_allowed());
    }

    #[test]
    fn test_closing_signal_still_halted() {
        let f = fixture(RiskConfig::default());
        f.gate.refresh(
            AccountSnapshot::flat(dec!(100000)),
            vec![long("AAPL", dec!(10))],
        );
        f.gate.halt("ops");
        assert!(matches!(
            f.gate.can_admit(&signal("AAPL", Side::Sell, dec!(99))),
            AdmissionDecision::Halt(_)
        ));
    }

    #[test]
    fn test_correlation_ceiling() {
        let config = RiskConfig {
            correlation_groups: vec![CorrelationGroup {
                name: "tech".to_string(),
                symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
                coefficient: dec!(0.9),
            }],
            ..RiskConfig::default()
        };
        let f = fixture(config);
        f.gate.refresh(
            AccountSnapshot::flat(dec!(100000)),
            vec![long("AAPL", dec!(10))],
        );

        assert!(matches!(
            f.gate.can_admit(&signal("MSFT", Side::Buy, dec!(90))),
            AdmissionDecision::Block(RiskRejection::Correlation { .. })
        ));
        assert!(f.gate.can_admit(&signal("MSFT", Side::Sell, dec!(90))).is_allowed());
        assert!(f.gate.can_admit(&signal("TSLA", Side::Buy, dec!(90))).is_allowed());
    }

    #[test]
    fn test_apply_fill_tracks_positions() {
        let f = fixture(RiskConfig::default());
        f.gate.apply_fill(&PositionDelta {
            symbol: "AAPL".to_string(),
            realized_pnl: Decimal::ZERO,
            position_after: Some(long("AAPL", dec!(5))),
        });
        assert_eq!(f.gate.view().open_positions, 1);
        assert!(f.gate.position("AAPL").is_some());

        f.gate.apply_fill(&PositionDelta {
            symbol: "AAPL".to_string(),
            realized_pnl: dec!(25),
            position_after: None,
        });
        assert!(f.gate.positions().is_empty());
        assert_eq!(f.gate.view().equity, dec!(100025));
        assert_eq!(f.gate.equity_curve().len(), 2);
    }

    #[test]
    fn test_restores_halt_from_store_in_same_session() {
        let f = fixture(RiskConfig::default());
        f.gate.apply_fill(&loss(dec!(-6000)));
        assert!(f.gate.is_halted());

        let reopened = RiskGate::open(
            AccountId::from("acct"),
            &RiskConfig::default(),
            AccountSnapshot::flat(dec!(94000)),
            f.store.clone(),
            f.sink.clone(),
            f.clock.clone(),
        )
        .unwrap();
        assert!(reopened.is_halted());
        assert_eq!(reopened.view().peak_equity, dec!(100000));
        assert_eq!(reopened.view().daily_pnl, dec!(-6000));

        f.clock.advance(DAY_MS);
        let next_day = RiskGate::open(
            AccountId::from("acct"),
            &RiskConfig::default(),
            AccountSnapshot::flat(dec!(94000)),
            f.store.clone(),
            f.sink.clone(),
            f.clock.clone(),
        )
        .unwrap();
        assert!(!next_day.is_halted());
        assert_eq!(next_day.view().peak_equity, dec!(94000));
    }
}
