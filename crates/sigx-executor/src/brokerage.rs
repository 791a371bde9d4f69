//! Brokerage abstraction.
//!
//! Every call returns a boxed future so the trait stays object safe and an
//! `Arc<dyn Brokerage>` can be shared across worker tasks.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sigx_core::{AccountSnapshot, Bracket, ClientOrderId, Position, Price, Quantity, Side};

use crate::error::BrokerResult;

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Market order submitted to the brokerage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub side: Side,
    pub quantity: Quantity,
    /// Price the signal was generated at. Paper fills use it.
    pub reference_price: Price,
    /// Protective legs. Never set on closing orders.
    pub bracket: Option<Bracket>,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Working at the brokerage (bracket child legs).
    Open,
    Filled,
    Cancelled,
}

/// Order as reported by the brokerage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub order_ref: String,
    pub client_order_id: ClientOrderId,
    /// Parent entry for bracket child legs.
    pub parent_client_order_id: Option<ClientOrderId>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Quantity,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    pub filled_price: Option<Price>,
}

impl BrokerOrder {
    /// Whether this order is `client_order_id` or one of its child legs.
    #[must_use]
    pub fn belongs_to(&self, client_order_id: &ClientOrderId) -> bool {
        &self.client_order_id == client_order_id
            || self.parent_client_order_id.as_ref() == Some(client_order_id)
    }
}

/// Trait for brokerage access (allows mocking).
pub trait Brokerage: Send + Sync {
    fn get_account(&self) -> BoxFuture<'_, BrokerResult<AccountSnapshot>>;

    fn get_positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>>;

    /// Orders still working at the brokerage.
    fn get_open_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<BrokerOrder>>>;

    /// Look up an order of any status by client order id.
    fn get_order<'a>(
        &'a self,
        client_order_id: &'a ClientOrderId,
    ) -> BoxFuture<'a, BrokerResult<Option<BrokerOrder>>>;

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<BrokerOrder>>;
}

pub type DynBrokerage = Arc<dyn Brokerage>;
