//! Order-side task trait and in-memory stub.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use common::{LineItem, OrderContext, OrderId, PaymentId};

use crate::error::TaskError;

/// Authorization returned by the payment gateway.
#[derive(Debug, Clone)]
pub struct ChargeAuthorization {
    /// Captured amount; None when the gateway reports nothing.
    pub amount: Option<i64>,
}

/// Order-side external tasks.
#[async_trait]
pub trait OrderTasks: Send + Sync {
    /// Loads the order's line items from the upstream order feed.
    async fn receive_order(&self, order_id: &OrderId) -> Result<Vec<LineItem>, TaskError>;

    /// Checks that the order is well formed.
    async fn validate_order(&self, order: &OrderContext) -> Result<(), TaskError>;

    /// Charges the payment gateway.
    ///
    /// The gateway is not idempotent. Callers must hold the ledger
    /// claim for `payment_id` before calling.
    async fn charge_payment(
        &self,
        order: &OrderContext,
        payment_id: &PaymentId,
    ) -> Result<ChargeAuthorization, TaskError>;
}

#[derive(Debug, Default)]
struct StubOrderState {
    items: Vec<LineItem>,
    receive_failures: u32,
    validate_failures: u32,
    charge_failures: u32,
    receive_delay: Option<Duration>,
    receive_calls: u32,
    validate_calls: u32,
    charge_calls: u32,
}

/// In-memory order tasks for local runs and tests.
#[derive(Debug, Clone)]
pub struct StubOrderTasks {
    state: Arc<RwLock<StubOrderState>>,
}

impl Default for StubOrderTasks {
    fn default() -> Self {
        Self::with_items(vec![LineItem::new("ABC", 1)])
    }
}

impl StubOrderTasks {
    /// Creates stub tasks serving a one-item order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates stub tasks serving the given items.
    pub fn with_items(items: Vec<LineItem>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StubOrderState {
                items,
                ..StubOrderState::default()
            })),
        }
    }

    /// Replaces the items future receive calls return.
    pub fn set_items(&self, items: Vec<LineItem>) {
        self.state.write().unwrap().items = items;
    }

    /// Makes the next `n` receive calls fail.
    pub fn fail_receive(&self, n: u32) {
        self.state.write().unwrap().receive_failures = n;
    }

    /// Makes the next `n` validate calls fail.
    pub fn fail_validate(&self, n: u32) {
        self.state.write().unwrap().validate_failures = n;
    }

    /// Makes the next `n` charge calls fail.
    pub fn fail_charge(&self, n: u32) {
        self.state.write().unwrap().charge_failures = n;
    }

    /// Stalls the next receive call for `delay`. Consumed once.
    pub fn delay_receive_once(&self, delay: Duration) {
        self.state.write().unwrap().receive_delay = Some(delay);
    }

    pub fn receive_calls(&self) -> u32 {
        self.state.read().unwrap().receive_calls
    }

    pub fn validate_calls(&self) -> u32 {
        self.state.read().unwrap().validate_calls
    }

    pub fn charge_calls(&self) -> u32 {
        self.state.read().unwrap().charge_calls
    }
}

#[async_trait]
impl OrderTasks for StubOrderTasks {
    async fn receive_order(&self, _order_id: &OrderId) -> Result<Vec<LineItem>, TaskError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.receive_calls += 1;
            if state.receive_failures > 0 {
                state.receive_failures -= 1;
                return Err(TaskError::new("order feed unavailable"));
            }
            state.receive_delay.take()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.read().unwrap().items.clone())
    }

    async fn validate_order(&self, order: &OrderContext) -> Result<(), TaskError> {
        let mut state = self.state.write().unwrap();
        state.validate_calls += 1;
        if state.validate_failures > 0 {
            state.validate_failures -= 1;
            return Err(TaskError::new("validator unavailable"));
        }
        if order.items.is_empty() {
            return Err(TaskError::new("no items to validate"));
        }
        Ok(())
    }

    async fn charge_payment(
        &self,
        order: &OrderContext,
        _payment_id: &PaymentId,
    ) -> Result<ChargeAuthorization, TaskError> {
        let mut state = self.state.write().unwrap();
        state.charge_calls += 1;
        if state.charge_failures > 0 {
            state.charge_failures -= 1;
            return Err(TaskError::new("gateway unavailable"));
        }
        Ok(ChargeAuthorization {
            amount: Some(order.total_quantity()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Address;

    #[tokio::test]
    async fn test_default_order_has_one_item() {
        let tasks = StubOrderTasks::new();
        let items = tasks.receive_order(&OrderId::new("o-1")).await.unwrap();
        assert_eq!(items, vec![LineItem::new("ABC", 1)]);
        assert_eq!(tasks.receive_calls(), 1);
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_order() {
        let tasks = StubOrderTasks::new();
        let empty = OrderContext::new(OrderId::new("o-1"), vec![]);
        let result = tasks.validate_order(&empty).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failure_budget_consumed_in_order() {
        let tasks = StubOrderTasks::new();
        tasks.fail_receive(2);
        let order_id = OrderId::new("o-1");

        assert!(tasks.receive_order(&order_id).await.is_err());
        assert!(tasks.receive_order(&order_id).await.is_err());
        assert!(tasks.receive_order(&order_id).await.is_ok());
        assert_eq!(tasks.receive_calls(), 3);
    }

    #[tokio::test]
    async fn test_charge_amount_sums_quantities() {
        let tasks =
            StubOrderTasks::with_items(vec![LineItem::new("ABC", 2), LineItem::new("XYZ", 3)]);
        let order = OrderContext::new(OrderId::new("o-1"), vec![
            LineItem::new("ABC", 2),
            LineItem::new("XYZ", 3),
        ])
        .with_address(Address::new());

        let auth = tasks
            .charge_payment(&order, &PaymentId::new("p-1"))
            .await
            .unwrap();
        assert_eq!(auth.amount, Some(5));
    }
}
