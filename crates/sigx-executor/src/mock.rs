//! Scripted brokerage for failure injection.
//!
//! Wraps a [`PaperBrokerage`] and consumes one [`MockStep`] per
//! `place_order` call. With an empty script every call goes straight to the
//! paper book.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use sigx_core::{AccountSnapshot, ClientOrderId, Position};

use crate::brokerage::{BoxFuture, BrokerOrder, Brokerage, OrderRequest};
use crate::error::{BrokerError, BrokerResult};
use crate::paper::PaperBrokerage;

/// Scripted behavior of the next `place_order` call.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Fail without reaching the book.
    Fail(BrokerError),
    /// Never respond.
    Hang,
    /// Fill on the book, then never respond (lost acknowledgement).
    FillThenHang,
    /// Respond normally after a delay.
    Delay(Duration),
}

pub struct MockBrokerage {
    paper: PaperBrokerage,
    script: Mutex<VecDeque<MockStep>>,
    placed: Mutex<Vec<OrderRequest>>,
    read_failure: Mutex<Option<BrokerError>>,
}

impl MockBrokerage {
    pub fn new(paper: PaperBrokerage) -> Self {
        Self {
            paper,
            script: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            read_failure: Mutex::new(None),
        }
    }

    /// Queue behavior for a future `place_order` call.
    pub fn push_step(&self, step: MockStep) {
        self.script.lock().push_back(step);
    }

    /// Make every read call fail until cleared with `None`.
    pub fn set_read_failure(&self, failure: Option<BrokerError>) {
        *self.read_failure.lock() = failure;
    }

    /// Every `place_order` request received, in order.
    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }

    pub fn place_count(&self) -> usize {
        self.placed.lock().len()
    }

    pub fn paper(&self) -> &PaperBrokerage {
        &self.paper
    }

    fn check_read(&self) -> BrokerResult<()> {
        match self.read_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Brokerage for MockBrokerage {
    fn get_account(&self) -> BoxFuture<'_, BrokerResult<AccountSnapshot>> {
        Box::pin(async move {
            self.check_read()?;
            self.paper.get_account().await
        })
    }

    fn get_positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>> {
        Box::pin(async move {
            self.check_read()?;
            self.paper.get_positions().await
        })
    }

    fn get_open_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<BrokerOrder>>> {
        Box::pin(async move {
            self.check_read()?;
            self.paper.get_open_orders().await
        })
    }

    fn get_order<'a>(
        &'a self,
        client_order_id: &'a ClientOrderId,
    ) -> BoxFuture<'a, BrokerResult<Option<BrokerOrder>>> {
        Box::pin(async move {
            self.check_read()?;
            self.paper.get_order(client_order_id).await
        })
    }

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<BrokerOrder>> {
        Box::pin(async move {
            self.placed.lock().push(request.clone());
            let step = self.script.lock().pop_front();
            match step {
                None => self.paper.place_order(request).await,
                Some(MockStep::Fail(err)) => Err(err),
                Some(MockStep::Hang) => std::future::pending().await,
                Some(MockStep::FillThenHang) => {
                    let _ = self.paper.place_order(request).await;
                    std::future::pending().await
                }
                Some(MockStep::Delay(delay)) => {
                    tokio::time::sleep(delay).await;
                    self.paper.place_order(request).await
                }
            }
        })
    }
}
