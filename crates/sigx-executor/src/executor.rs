//! Signal executor.
//!
//! Executes one admitted signal against the brokerage:
//! 1. Read the current position for the symbol
//! 2. Reconcile first if an earlier attempt may have reached the brokerage
//! 3. Classify the intent and validate bracket geometry
//! 4. Size the entry and place the order legs
//!
//! Validation always happens before any order is placed. Every brokerage
//! call runs under the configured timeout; a timeout is a transient error
//! and the queue marks the signal for reconciliation on retry.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use sigx_core::{
    AccountSnapshot, Bracket, ClientOrderId, Clock, ExecutionOutcome, Instrument,
    InstrumentRegistry, OrderIntent, OrderLeg, Position, PositionDelta, PositionSide, Price,
    Quantity, Side, Signal,
};
use sigx_telemetry::Metrics;

use crate::bracket::validate_bracket;
use crate::brokerage::{BoxFuture, BrokerOrder, DynBrokerage, OrderRequest};
use crate::config::ExecutorConfig;
use crate::error::{BrokerError, BrokerResult, ExecutorError, ExecutorResult, ValidationError};
use crate::intent::classify_intent;
use crate::sizing::size_position;

// ============================================================================
// Report
// ============================================================================

/// Outcome of one execution plus its effect on the account.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    /// Present on success only.
    pub delta: Option<PositionDelta>,
}

/// A completed execution before it is turned into a report.
#[derive(Debug)]
struct Fill {
    intent: OrderIntent,
    order_ref: String,
    price: Price,
    qty: Quantity,
    realized_pnl: Decimal,
    position_after: Option<Position>,
}

/// Order legs of an earlier attempt found at the brokerage.
#[derive(Debug, Default)]
struct PriorLegs {
    open: Option<BrokerOrder>,
    close: Option<BrokerOrder>,
}

// ============================================================================
// SignalExecutor
// ============================================================================

pub struct SignalExecutor {
    broker: DynBrokerage,
    instruments: Arc<InstrumentRegistry>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
}

impl SignalExecutor {
    pub fn new(
        broker: DynBrokerage,
        instruments: Arc<InstrumentRegistry>,
        config: ExecutorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker,
            instruments,
            config,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[must_use]
    pub fn broker(&self) -> &DynBrokerage {
        &self.broker
    }

    /// Account snapshot and open positions, for refreshing the risk gate.
    pub async fn account_state(&self) -> BrokerResult<(AccountSnapshot, Vec<Position>)> {
        let snapshot = self.call("get_account", self.broker.get_account()).await?;
        let positions = self
            .call("get_positions", self.broker.get_positions())
            .await?;
        Ok((snapshot, positions))
    }

    /// Execute `signal`, sizing new entries at `position_size_pct` percent of
    /// equity. Never panics or propagates; every failure becomes a classified
    /// outcome.
    pub async fn execute(&self, signal: &Signal, position_size_pct: Decimal) -> ExecutionReport {
        let started = Instant::now();
        let result = self.try_execute(signal, position_size_pct).await;
        self.report(signal, result, started)
    }

    /// Complete a signal whose earlier attempt already reached the brokerage,
    /// without placing any order.
    ///
    /// Returns `None` when the signal was never reclaimed, when nothing of
    /// the earlier attempt is found, when a flip still needs its open leg, or
    /// when the brokerage cannot be read. The signal then goes through
    /// admission and `execute` as usual.
    pub async fn recover(&self, signal: &Signal) -> Option<ExecutionReport> {
        if !signal.needs_reconcile {
            return None;
        }
        let started = Instant::now();
        let instrument = self.instruments.resolve(&signal.symbol);

        let found = async {
            let position = self.current_position(&signal.symbol).await?;
            let prior = self.reconcile(signal).await?;
            Ok::<_, ExecutorError>(self.prior_fill(signal, &instrument, position.as_ref(), &prior))
        }
        .await;

        match found {
            Ok(Some(fill)) => Some(self.report(signal, Ok(fill), started)),
            Ok(None) => None,
            Err(e) => {
                warn!(
                    signal_id = %signal.id,
                    error = %e,
                    "Recovery check failed, falling back to execution"
                );
                None
            }
        }
    }

    fn report(
        &self,
        signal: &Signal,
        result: ExecutorResult<Fill>,
        started: Instant,
    ) -> ExecutionReport {
        let now_ms = self.clock.now_ms();

        match result {
            Ok(fill) => {
                info!(
                    signal_id = %signal.id,
                    account = %signal.account_id,
                    symbol = %signal.symbol,
                    intent = %fill.intent,
                    order_ref = %fill.order_ref,
                    qty = %fill.qty,
                    price = %fill.price,
                    realized_pnl = %fill.realized_pnl,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Signal executed"
                );
                let outcome = ExecutionOutcome::success(
                    signal.id.clone(),
                    signal.account_id.clone(),
                    signal.symbol.clone(),
                    fill.intent,
                    fill.order_ref,
                    fill.price,
                    fill.qty,
                    now_ms,
                )
                .with_realized_pnl(fill.realized_pnl);
                ExecutionReport {
                    outcome,
                    delta: Some(PositionDelta {
                        symbol: signal.symbol.clone(),
                        realized_pnl: fill.realized_pnl,
                        position_after: fill.position_after,
                    }),
                }
            }
            Err(e) => {
                let kind = e.kind();
                warn!(
                    signal_id = %signal.id,
                    account = %signal.account_id,
                    symbol = %signal.symbol,
                    kind = %kind,
                    error = %e,
                    "Signal execution failed"
                );
                ExecutionReport {
                    outcome: ExecutionOutcome::failure(
                        signal.id.clone(),
                        signal.account_id.clone(),
                        signal.symbol.clone(),
                        kind,
                        e.to_string(),
                        now_ms,
                    ),
                    delta: None,
                }
            }
        }
    }

    async fn try_execute(&self, signal: &Signal, position_size_pct: Decimal) -> ExecutorResult<Fill> {
        let instrument = self.instruments.resolve(&signal.symbol);
        let position = self.current_position(&signal.symbol).await?;

        if signal.needs_reconcile {
            let prior = self.reconcile(signal).await?;
            if let Some(fill) = self
                .resume_from(signal, &instrument, position.as_ref(), prior, position_size_pct)
                .await?
            {
                return Ok(fill);
            }
        }

        let intent = classify_intent(
            &signal.symbol,
            signal.action,
            position.as_ref(),
            instrument.asset_class,
            &self.config,
        )?;
        debug!(signal_id = %signal.id, intent = %intent, "Intent classified");

        match (intent, position) {
            (OrderIntent::Open, existing) => {
                let bracket = self.bracket_for(signal)?;
                let exposure = existing
                    .as_ref()
                    .map(Position::notional)
                    .unwrap_or(Decimal::ZERO);
                let order = self
                    .open_leg(signal, &instrument, position_size_pct, exposure, bracket)
                    .await?;
                Ok(self.open_fill(OrderIntent::Open, signal, order, existing, Decimal::ZERO))
            }
            (OrderIntent::Close, Some(held)) => {
                let order = self.close_leg(signal, &held).await?;
                Ok(self.close_fill(signal, order, &held))
            }
            (OrderIntent::Flip, Some(held)) => {
                let bracket = self.bracket_for(signal)?;
                let close = self.close_leg(signal, &held).await?;
                let realized = held.unrealized_pnl(fill_price(&close, signal));
                let open = self
                    .open_leg(signal, &instrument, position_size_pct, Decimal::ZERO, bracket)
                    .await?;
                Ok(self.open_fill(OrderIntent::Flip, signal, open, None, realized))
            }
            (_, None) => Err(ValidationError::NoPosition {
                symbol: signal.symbol.clone(),
            }
            .into()),
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Look for order legs of an earlier attempt.
    async fn reconcile(&self, signal: &Signal) -> ExecutorResult<PriorLegs> {
        let open_id = ClientOrderId::for_leg(&signal.id, OrderLeg::Open);
        let close_id = ClientOrderId::for_leg(&signal.id, OrderLeg::Close);

        let mut open = self.call("get_order", self.broker.get_order(&open_id)).await?;
        let close = self.call("get_order", self.broker.get_order(&close_id)).await?;

        if open.is_none() {
            let working = self
                .call("get_open_orders", self.broker.get_open_orders())
                .await?;
            open = working.into_iter().find(|o| o.belongs_to(&open_id));
        }

        info!(
            signal_id = %signal.id,
            open_leg_found = open.is_some(),
            close_leg_found = close.is_some(),
            "Reconciled with brokerage"
        );
        Ok(PriorLegs { open, close })
    }

    /// Finish an execution whose earlier attempt may have reached the
    /// brokerage. Returns `None` when nothing was found and the signal should
    /// execute from scratch.
    async fn resume_from(
        &self,
        signal: &Signal,
        instrument: &Instrument,
        position: Option<&Position>,
        prior: PriorLegs,
        position_size_pct: Decimal,
    ) -> ExecutorResult<Option<Fill>> {
        if let Some(fill) = self.prior_fill(signal, instrument, position, &prior) {
            return Ok(Some(fill));
        }
        if prior.close.is_none() {
            return Ok(None);
        }

        // Flip interrupted between legs: only the open leg is missing
        let bracket = self.bracket_for(signal)?;
        let open = self
            .open_leg(signal, instrument, position_size_pct, Decimal::ZERO, bracket)
            .await?;
        Ok(Some(self.open_fill(
            OrderIntent::Flip,
            signal,
            open,
            None,
            Decimal::ZERO,
        )))
    }

    /// Fill already completed by an earlier attempt, if any. Places nothing.
    fn prior_fill(
        &self,
        signal: &Signal,
        instrument: &Instrument,
        position: Option<&Position>,
        prior: &PriorLegs,
    ) -> Option<Fill> {
        // Open leg is always placed last, so finding it means the signal is done
        if let Some(open) = &prior.open {
            let intent = if prior.close.is_some() {
                OrderIntent::Flip
            } else {
                OrderIntent::Open
            };
            return Some(self.reconciled_fill(intent, signal, open, position));
        }

        if let Some(close) = &prior.close {
            let flips = self.config.flip_on_reverse
                && (signal.action == Side::Buy || instrument.asset_class.supports_short());
            if !flips || position.is_some() {
                return Some(self.reconciled_fill(OrderIntent::Close, signal, close, position));
            }
            return None;
        }

        // Position already points the way the signal asked
        let held = position?;
        if held.side != PositionSide::from(signal.action) || self.config.allow_additions {
            return None;
        }
        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            "Position already reflects signal, not resubmitting"
        );
        Some(Fill {
            intent: OrderIntent::Open,
            order_ref: format!(
                "reconciled:{}",
                ClientOrderId::for_leg(&signal.id, OrderLeg::Open)
            ),
            price: held.entry_price,
            qty: held.quantity,
            realized_pnl: Decimal::ZERO,
            position_after: Some(held.clone()),
        })
    }

    fn reconciled_fill(
        &self,
        intent: OrderIntent,
        signal: &Signal,
        order: &BrokerOrder,
        position: Option<&Position>,
    ) -> Fill {
        Fill {
            intent,
            order_ref: order.order_ref.clone(),
            price: fill_price(order, signal),
            qty: order.filled_qty,
            realized_pnl: Decimal::ZERO,
            position_after: position.cloned(),
        }
    }

    // ------------------------------------------------------------------------
    // Order legs
    // ------------------------------------------------------------------------

    fn bracket_for(&self, signal: &Signal) -> Result<Option<Bracket>, ValidationError> {
        validate_bracket(
            signal.action,
            signal.entry_price,
            signal.stop_price,
            signal.target_price,
        )
    }

    async fn open_leg(
        &self,
        signal: &Signal,
        instrument: &Instrument,
        position_size_pct: Decimal,
        exposure: Decimal,
        bracket: Option<Bracket>,
    ) -> ExecutorResult<BrokerOrder> {
        let account = self.call("get_account", self.broker.get_account()).await?;
        let quantity = size_position(
            &signal.symbol,
            account.equity,
            position_size_pct,
            exposure,
            signal.entry_price,
            instrument.lot_size(),
        )?;

        let request = OrderRequest {
            client_order_id: ClientOrderId::for_leg(&signal.id, OrderLeg::Open),
            symbol: signal.symbol.clone(),
            side: signal.action,
            quantity,
            reference_price: signal.entry_price,
            bracket,
            reduce_only: false,
        };
        Ok(self
            .call("place_order", self.broker.place_order(request))
            .await?)
    }

    async fn close_leg(&self, signal: &Signal, position: &Position) -> ExecutorResult<BrokerOrder> {
        let request = OrderRequest {
            client_order_id: ClientOrderId::for_leg(&signal.id, OrderLeg::Close),
            symbol: signal.symbol.clone(),
            side: position.side.exit_side(),
            quantity: position.quantity,
            reference_price: signal.entry_price,
            bracket: None,
            reduce_only: true,
        };
        Ok(self
            .call("place_order", self.broker.place_order(request))
            .await?)
    }

    fn open_fill(
        &self,
        intent: OrderIntent,
        signal: &Signal,
        order: BrokerOrder,
        existing: Option<Position>,
        realized_pnl: Decimal,
    ) -> Fill {
        let price = fill_price(&order, signal);
        let qty = order.filled_qty;
        let position_after = match existing {
            Some(mut held) => {
                let total = held.quantity + qty;
                let cost = held.notional() + qty.notional(price);
                if total.is_positive() {
                    held.entry_price = Price::new(cost / total.inner());
                }
                held.quantity = total;
                held
            }
            None => Position {
                symbol: signal.symbol.clone(),
                side: PositionSide::from(signal.action),
                quantity: qty,
                entry_price: price,
                opened_at_ms: self.clock.now_ms(),
            },
        };

        Fill {
            intent,
            order_ref: order.order_ref,
            price,
            qty,
            realized_pnl,
            position_after: Some(position_after),
        }
    }

    fn close_fill(&self, signal: &Signal, order: BrokerOrder, held: &Position) -> Fill {
        let price = fill_price(&order, signal);
        Fill {
            intent: OrderIntent::Close,
            realized_pnl: held.unrealized_pnl(price),
            order_ref: order.order_ref,
            price,
            qty: order.filled_qty,
            position_after: None,
        }
    }

    // ------------------------------------------------------------------------
    // Brokerage access
    // ------------------------------------------------------------------------

    async fn current_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        let positions = self
            .call("get_positions", self.broker.get_positions())
            .await?;
        Ok(positions.into_iter().find(|p| p.symbol == symbol))
    }

    /// Run one brokerage call under the configured timeout.
    async fn call<T>(
        &self,
        op: &'static str,
        fut: BoxFuture<'_, BrokerResult<T>>,
    ) -> BrokerResult<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.broker_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout {
                op,
                timeout_ms: self.config.broker_timeout_ms,
            }),
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let label = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        Metrics::broker_call(label, latency_ms);
        if let Err(e) = &result {
            debug!(op, error = %e, latency_ms, "Brokerage call failed");
        }
        result
    }
}

fn fill_price(order: &BrokerOrder, signal: &Signal) -> Price {
    order.filled_price.unwrap_or(signal.entry_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokerage::Brokerage;
    use crate::exits::ExitPolicy;
    use crate::mock::{MockBrokerage, MockStep};
    use crate::paper::PaperBrokerage;
    use rust_decimal_macros::dec;
    use sigx_core::{AccountId, AssetClass, ErrorKind, IncomingSignal, ManualClock};

    struct Harness {
        broker: Arc<MockBrokerage>,
        executor: SignalExecutor,
    }

    fn harness(config: ExecutorConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000));
        let broker = Arc::new(MockBrokerage::new(PaperBrokerage::new(
            dec!(100000),
            ExitPolicy::default(),
            clock.clone(),
        )));
        let instruments = InstrumentRegistry::from_instruments([
            Instrument::new("AAPL", AssetClass::Equity),
            Instrument::new("BTC-USD", AssetClass::Crypto),
        ]);
        let executor = SignalExecutor::new(
            broker.clone(),
            Arc::new(instruments),
            config,
            clock,
        );
        Harness { broker, executor }
    }

    fn signal(
        id: &str,
        symbol: &str,
        action: Side,
        stop: Option<Decimal>,
        target: Option<Decimal>,
    ) -> Signal {
        let incoming = IncomingSignal {
            id: Some(id.into()),
            account_id: None,
            symbol: symbol.to_string(),
            timestamp_ms: 1_000,
            action,
            confidence: dec!(80),
            entry_price: Price::new(dec!(100)),
            stop_price: stop.map(Price::new),
            target_price: target.map(Price::new),
            regime: None,
            priority: 0,
            expires_at_ms: None,
        };
        Signal::from_incoming(incoming, &AccountId::from("acct"), 1_000, 60_000).unwrap()
    }

    #[tokio::test]
    async fn test_open_with_bracket() {
        let h = harness(ExecutorConfig::default());
        let s = signal("s1", "AAPL", Side::Buy, Some(dec!(95)), Some(dec!(110)));

        let report = h.executor.execute(&s, dec!(10)).await;
        assert!(report.outcome.is_success());
        assert_eq!(report.outcome.intent, Some(OrderIntent::Open));
        // 10% of 100k at 100 => 100 shares
        assert_eq!(report.outcome.filled_qty, Some(Quantity::new(dec!(100))));

        let placed = h.broker.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].client_order_id.as_str(), "sigx_s1_open");
        assert!(placed[0].bracket.is_some());

        let after = report.delta.unwrap().position_after.unwrap();
        assert_eq!(after.side, PositionSide::Long);
    }

    #[tokio::test]
    async fn test_invalid_bracket_never_reaches_broker() {
        let h = harness(ExecutorConfig::default());
        let s = signal("s1", "AAPL", Side::Buy, Some(dec!(105)), Some(dec!(90)));

        let report = h.executor.execute(&s, dec!(10)).await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::Validation));
        assert_eq!(h.broker.place_count(), 0);
    }

    #[tokio::test]
    async fn test_spot_short_never_reaches_broker() {
        let h = harness(ExecutorConfig::default());
        let s = signal("s1", "BTC-USD", Side::Sell, None, None);

        let report = h.executor.execute(&s, dec!(10)).await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::Validation));
        assert_eq!(h.broker.place_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_signal_closes_without_bracket() {
        let h = harness(ExecutorConfig::default());
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;

        let mut exit = signal("s2", "AAPL", Side::Sell, Some(dec!(90)), Some(dec!(105)));
        exit.entry_price = Price::new(dec!(102));
        let report = h.executor.execute(&exit, dec!(10)).await;

        assert_eq!(report.outcome.intent, Some(OrderIntent::Close));
        assert_eq!(report.outcome.realized_pnl, Some(dec!(200)));
        let placed = h.broker.placed();
        assert_eq!(placed[1].client_order_id.as_str(), "sigx_s2_close");
        assert!(placed[1].bracket.is_none());
        assert!(placed[1].reduce_only);
        assert!(report.delta.unwrap().position_after.is_none());
    }

    #[tokio::test]
    async fn test_flip_places_close_then_open() {
        let h = harness(ExecutorConfig {
            flip_on_reverse: true,
            ..ExecutorConfig::default()
        });
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;

        let report = h
            .executor
            .execute(&signal("s2", "AAPL", Side::Sell, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.intent, Some(OrderIntent::Flip));

        let ids: Vec<String> = h
            .broker
            .placed()
            .iter()
            .map(|r| r.client_order_id.to_string())
            .collect();
        assert_eq!(ids, vec!["sigx_s1_open", "sigx_s2_close", "sigx_s2_open"]);
        let positions = h.broker.get_positions().await.unwrap();
        assert_eq!(positions[0].side, PositionSide::Short);
    }

    #[tokio::test]
    async fn test_same_direction_without_additions_fails_validation() {
        let h = harness(ExecutorConfig::default());
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        let report = h
            .executor
            .execute(&signal("s2", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::Validation));
        assert_eq!(h.broker.place_count(), 1);
    }

    #[tokio::test]
    async fn test_addition_fills_remaining_headroom() {
        let h = harness(ExecutorConfig {
            allow_additions: true,
            ..ExecutorConfig::default()
        });
        // 4% of 100k at 100 => 40 shares held
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(4))
            .await;

        let report = h
            .executor
            .execute(&signal("s2", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.intent, Some(OrderIntent::Open));
        assert_eq!(report.outcome.filled_qty, Some(Quantity::new(dec!(60))));
        let after = report.delta.unwrap().position_after.unwrap();
        assert_eq!(after.quantity, Quantity::new(dec!(100)));

        // Symbol is at its cap, nothing left to add
        let full = h
            .executor
            .execute(&signal("s3", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(full.outcome.error_kind, Some(ErrorKind::Validation));
        assert_eq!(h.broker.place_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let h = harness(ExecutorConfig {
            broker_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        h.broker.push_step(MockStep::Hang);

        let report = h
            .executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::TransientBroker));
        assert!(report.outcome.is_retryable());
    }

    #[tokio::test]
    async fn test_terminal_broker_error() {
        let h = harness(ExecutorConfig::default());
        h.broker
            .push_step(MockStep::Fail(BrokerError::Rejected("halted".to_string())));

        let report = h
            .executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::TerminalBroker));
    }

    #[tokio::test]
    async fn test_reconcile_after_lost_ack_does_not_resubmit() {
        let h = harness(ExecutorConfig {
            broker_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        h.broker.push_step(MockStep::FillThenHang);

        let mut s = signal("s1", "AAPL", Side::Buy, None, None);
        let first = h.executor.execute(&s, dec!(10)).await;
        assert!(first.outcome.is_retryable());

        s.needs_reconcile = true;
        let second = h.executor.execute(&s, dec!(10)).await;
        assert!(second.outcome.is_success());
        assert_eq!(h.broker.place_count(), 1);
        assert_eq!(h.broker.paper().order_count(), 1);
    }

    #[tokio::test]
    async fn test_recover_completes_filled_signal() {
        let h = harness(ExecutorConfig {
            broker_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        h.broker.push_step(MockStep::FillThenHang);

        let mut s = signal("s1", "AAPL", Side::Buy, None, None);
        assert!(h.executor.recover(&s).await.is_none());
        h.executor.execute(&s, dec!(10)).await;

        s.needs_reconcile = true;
        let report = h.executor.recover(&s).await.unwrap();
        assert!(report.outcome.is_success());
        assert!(report.delta.unwrap().position_after.is_some());
        assert_eq!(h.broker.place_count(), 1);
    }

    #[tokio::test]
    async fn test_recover_defers_unfinished_flip() {
        let h = harness(ExecutorConfig {
            flip_on_reverse: true,
            broker_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        h.broker.push_step(MockStep::FillThenHang);
        let mut flip = signal("s2", "AAPL", Side::Sell, None, None);
        h.executor.execute(&flip, dec!(10)).await;

        flip.needs_reconcile = true;
        assert!(h.executor.recover(&flip).await.is_none());
        assert_eq!(h.broker.place_count(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_with_nothing_found_executes() {
        let h = harness(ExecutorConfig::default());
        let mut s = signal("s1", "AAPL", Side::Buy, None, None);
        s.needs_reconcile = true;

        let report = h.executor.execute(&s, dec!(10)).await;
        assert!(report.outcome.is_success());
        assert_eq!(h.broker.place_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_flip_with_close_done_only_opens() {
        let h = harness(ExecutorConfig {
            flip_on_reverse: true,
            broker_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        h.executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;

        h.broker.push_step(MockStep::FillThenHang);
        let mut flip = signal("s2", "AAPL", Side::Sell, None, None);
        let first = h.executor.execute(&flip, dec!(10)).await;
        assert!(first.outcome.is_retryable());
        assert!(h.broker.get_positions().await.unwrap().is_empty());

        flip.needs_reconcile = true;
        let second = h.executor.execute(&flip, dec!(10)).await;
        assert_eq!(second.outcome.intent, Some(OrderIntent::Flip));

        let ids: Vec<String> = h
            .broker
            .placed()
            .iter()
            .map(|r| r.client_order_id.to_string())
            .collect();
        assert_eq!(ids, vec!["sigx_s1_open", "sigx_s2_close", "sigx_s2_open"]);
    }

    #[tokio::test]
    async fn test_account_state_read_failure() {
        let h = harness(ExecutorConfig::default());
        h.broker
            .set_read_failure(Some(BrokerError::Connection("down".to_string())));
        assert!(h.executor.account_state().await.is_err());

        let report = h
            .executor
            .execute(&signal("s1", "AAPL", Side::Buy, None, None), dec!(10))
            .await;
        assert_eq!(report.outcome.error_kind, Some(ErrorKind::TransientBroker));
        assert_eq!(h.broker.place_count(), 0);
    }
}
