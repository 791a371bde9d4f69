//! In-memory paper brokerage.
//!
//! Market orders fill immediately at the request's reference price. Bracket
//! legs are kept as working child orders and fire on `on_bar` through the
//! configured [`ExitPolicy`]. Resubmitting a client order id returns the
//! original order instead of filling twice.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use sigx_core::{
    AccountSnapshot, Bracket, ClientOrderId, Clock, Position, PositionSide, Price, Quantity, Side,
};

use crate::brokerage::{BoxFuture, BrokerOrder, Brokerage, OrderRequest, OrderStatus};
use crate::error::{BrokerError, BrokerResult};
use crate::exits::{ExitDecision, ExitPolicy};

#[derive(Debug, Clone)]
struct Holding {
    position: Position,
    mark: Price,
    bars_held: u32,
    bracket: Option<Bracket>,
    entry_order: ClientOrderId,
}

impl Holding {
    /// Signed market value: positive for long, negative for short.
    fn market_value(&self) -> Decimal {
        let value = self.position.quantity.notional(self.mark);
        match self.position.side {
            PositionSide::Long => value,
            PositionSide::Short => -value,
        }
    }
}

#[derive(Debug)]
struct PaperState {
    cash: Decimal,
    peak_equity: Decimal,
    holdings: HashMap<String, Holding>,
    orders: HashMap<ClientOrderId, BrokerOrder>,
    next_ref: u64,
}

impl PaperState {
    fn equity(&self) -> Decimal {
        self.cash + self.holdings.values().map(Holding::market_value).sum::<Decimal>()
    }

    fn next_order_ref(&mut self) -> String {
        self.next_ref += 1;
        format!("paper-{}", self.next_ref)
    }

    fn cancel_children(&mut self, parent: &ClientOrderId, except: Option<&ClientOrderId>) {
        for order in self.orders.values_mut() {
            if order.status == OrderStatus::Open
                && order.parent_client_order_id.as_ref() == Some(parent)
                && Some(&order.client_order_id) != except
            {
                order.status = OrderStatus::Cancelled;
            }
        }
    }

    /// Apply a fill to cash and holdings.
    fn apply_fill(
        &mut self,
        symbol: &str,
        side: Side,
        qty: Quantity,
        price: Price,
        client_order_id: &ClientOrderId,
        now_ms: u64,
    ) {
        let notional = qty.notional(price);
        match side {
            Side::Buy => self.cash -= notional,
            Side::Sell => self.cash += notional,
        }

        let direction = PositionSide::from(side);
        if !self.holdings.contains_key(symbol) {
            self.open_holding(symbol, direction, qty, price, client_order_id, now_ms);
            return;
        }
        let Some(holding) = self.holdings.get_mut(symbol) else {
            return;
        };

        holding.mark = price;
        if holding.position.side == direction {
            let total = holding.position.quantity + qty;
            let cost = holding.position.notional() + notional;
            holding.position.entry_price = Price::new(cost / total.inner());
            holding.position.quantity = total;
            return;
        }

        let held = holding.position.quantity;
        if qty < held {
            holding.position.quantity = held - qty;
            return;
        }

        let entry_order = holding.entry_order.clone();
        self.holdings.remove(symbol);
        self.cancel_children(&entry_order, None);
        let remainder = qty - held;
        if remainder.is_positive() {
            self.open_holding(symbol, direction, remainder, price, client_order_id, now_ms);
        }
    }

    fn open_holding(
        &mut self,
        symbol: &str,
        side: PositionSide,
        qty: Quantity,
        price: Price,
        client_order_id: &ClientOrderId,
        now_ms: u64,
    ) {
        self.holdings.insert(
            symbol.to_string(),
            Holding {
                position: Position {
                    symbol: symbol.to_string(),
                    side,
                    quantity: qty,
                    entry_price: price,
                    opened_at_ms: now_ms,
                },
                mark: price,
                bars_held: 0,
                bracket: None,
                entry_order: client_order_id.clone(),
            },
        );
    }
}

/// Paper trading brokerage.
pub struct PaperBrokerage {
    state: Mutex<PaperState>,
    exit_policy: ExitPolicy,
    clock: Arc<dyn Clock>,
}

impl PaperBrokerage {
    pub fn new(starting_cash: Decimal, exit_policy: ExitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash: starting_cash,
                peak_equity: starting_cash,
                holdings: HashMap::new(),
                orders: HashMap::new(),
                next_ref: 0,
            }),
            exit_policy,
            clock,
        }
    }

    /// Current equity at last marks.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.state.lock().equity()
    }

    /// Number of orders ever accepted, child legs included.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    /// Advance one bar for `symbol` at `price`.
    ///
    /// Re-marks the position and, when a bracket is attached, evaluates the
    /// exit policy. An exit fills the matching child leg at `price`, cancels
    /// the sibling and closes the position.
    pub fn on_bar(&self, symbol: &str, price: Price) -> ExitDecision {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock();

        let Some(holding) = state.holdings.get_mut(symbol) else {
            return ExitDecision::Hold;
        };
        holding.mark = price;
        holding.bars_held += 1;

        let Some(bracket) = holding.bracket else {
            return ExitDecision::Hold;
        };
        let decision =
            self.exit_policy
                .evaluate(&holding.position, holding.bars_held, price, &bracket);
        if !decision.is_exit() {
            return decision;
        }

        let position = holding.position.clone();
        let suffix = match decision {
            ExitDecision::StopLoss => "stop",
            _ => "target",
        };
        let child = ClientOrderId::from_string(format!("{}_{}", holding.entry_order, suffix));

        if let Some(order) = state.orders.get_mut(&child) {
            order.status = OrderStatus::Filled;
            order.filled_qty = position.quantity;
            order.filled_price = Some(price);
        }
        state.apply_fill(
            symbol,
            position.side.exit_side(),
            position.quantity,
            price,
            &child,
            now_ms,
        );

        info!(
            symbol = %symbol,
            decision = ?decision,
            price = %price,
            pnl = %position.unrealized_pnl(price),
            "Paper bracket leg filled"
        );
        decision
    }

    fn place(&self, request: OrderRequest) -> BrokerResult<BrokerOrder> {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock();

        if let Some(existing) = state.orders.get(&request.client_order_id) {
            debug!(
                client_order_id = %request.client_order_id,
                "Duplicate client order id, returning existing order"
            );
            return Ok(existing.clone());
        }
        if !request.quantity.is_positive() {
            return Err(BrokerError::Rejected(format!(
                "non-positive quantity {}",
                request.quantity
            )));
        }
        if !request.reference_price.is_positive() {
            return Err(BrokerError::Rejected("no reference price".to_string()));
        }

        let reduces = state
            .holdings
            .get(&request.symbol)
            .is_some_and(|h| h.position.is_closed_by(request.side));
        if !reduces {
            let notional = request.quantity.notional(request.reference_price);
            if notional > state.equity() {
                return Err(BrokerError::InsufficientFunds(format!(
                    "order notional {} exceeds equity {}",
                    notional,
                    state.equity()
                )));
            }
        } else if request.bracket.is_some() {
            return Err(BrokerError::Rejected(
                "bracket on a reducing order".to_string(),
            ));
        }

        state.apply_fill(
            &request.symbol,
            request.side,
            request.quantity,
            request.reference_price,
            &request.client_order_id,
            now_ms,
        );

        let order = BrokerOrder {
            order_ref: state.next_order_ref(),
            client_order_id: request.client_order_id.clone(),
            parent_client_order_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            status: OrderStatus::Filled,
            filled_qty: request.quantity,
            filled_price: Some(request.reference_price),
        };
        state
            .orders
            .insert(request.client_order_id.clone(), order.clone());

        if let Some(bracket) = request.bracket {
            if let Some(holding) = state.holdings.get_mut(&request.symbol) {
                holding.bracket = Some(bracket);
                holding.entry_order = request.client_order_id.clone();
                let quantity = holding.position.quantity;
                let exit_side = holding.position.side.exit_side();
                for suffix in ["stop", "target"] {
                    let child = BrokerOrder {
                        order_ref: state.next_order_ref(),
                        client_order_id: ClientOrderId::from_string(format!(
                            "{}_{}",
                            request.client_order_id, suffix
                        )),
                        parent_client_order_id: Some(request.client_order_id.clone()),
                        symbol: request.symbol.clone(),
                        side: exit_side,
                        quantity,
                        status: OrderStatus::Open,
                        filled_qty: Quantity::ZERO,
                        filled_price: None,
                    };
                    state.orders.insert(child.client_order_id.clone(), child);
                }
            }
        }

        let equity = state.equity();
        state.peak_equity = state.peak_equity.max(equity);

        debug!(
            order_ref = %order.order_ref,
            client_order_id = %order.client_order_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.quantity,
            "Paper order filled"
        );
        Ok(order)
    }

    fn snapshot(&self) -> AccountSnapshot {
        let mut state = self.state.lock();
        let equity = state.equity();
        state.peak_equity = state.peak_equity.max(equity);
        let gross: Decimal = state
            .holdings
            .values()
            .map(|h| h.market_value().abs())
            .sum();
        AccountSnapshot {
            buying_power: (equity - gross).max(Decimal::ZERO),
            cash: state.cash,
            portfolio_value: equity,
            equity,
            peak_equity: state.peak_equity,
        }
    }
}

impl Brokerage for PaperBrokerage {
    fn get_account(&self) -> BoxFuture<'_, BrokerResult<AccountSnapshot>> {
        Box::pin(async move { Ok(self.snapshot()) })
    }

    fn get_positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>> {
        Box::pin(async move {
            let state = self.state.lock();
            let mut positions: Vec<Position> =
                state.holdings.values().map(|h| h.position.clone()).collect();
            positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            Ok(positions)
        })
    }

    fn get_open_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<BrokerOrder>>> {
        Box::pin(async move {
            let state = self.state.lock();
            Ok(state
                .orders
                .values()
                .filter(|o| o.status == OrderStatus::Open)
                .cloned()
                .collect())
        })
    }

    fn get_order<'a>(
        &'a self,
        client_order_id: &'a ClientOrderId,
    ) -> BoxFuture<'a, BrokerResult<Option<BrokerOrder>>> {
        Box::pin(async move { Ok(self.state.lock().orders.get(client_order_id).cloned()) })
    }

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<BrokerOrder>> {
        Box::pin(async move { self.place(request) })
    }
}
