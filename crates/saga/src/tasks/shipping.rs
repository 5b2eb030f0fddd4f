//! Shipping-side task trait and in-memory stub.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use common::OrderContext;

use crate::error::TaskError;

/// Shipping-side external tasks.
#[async_trait]
pub trait ShippingTasks: Send + Sync {
    /// Stages the package in the warehouse.
    async fn prepare_package(&self, order: &OrderContext) -> Result<String, TaskError>;

    /// Hands the package to the carrier.
    async fn dispatch_carrier(&self, order: &OrderContext) -> Result<String, TaskError>;
}

#[derive(Debug, Default)]
struct StubShippingState {
    prepare_failures: u32,
    dispatch_failures: u32,
    dispatch_delay: Option<Duration>,
    prepare_calls: u32,
    dispatch_calls: u32,
}

/// In-memory shipping tasks for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StubShippingTasks {
    state: Arc<RwLock<StubShippingState>>,
}

impl StubShippingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` prepare calls fail.
    pub fn fail_prepare(&self, n: u32) {
        self.state.write().unwrap().prepare_failures = n;
    }

    /// Makes the next `n` dispatch calls fail.
    pub fn fail_dispatch(&self, n: u32) {
        self.state.write().unwrap().dispatch_failures = n;
    }

    /// Stalls every dispatch call for `delay` until cleared.
    pub fn delay_dispatch(&self, delay: Duration) {
        self.state.write().unwrap().dispatch_delay = Some(delay);
    }

    pub fn prepare_calls(&self) -> u32 {
        self.state.read().unwrap().prepare_calls
    }

    pub fn dispatch_calls(&self) -> u32 {
        self.state.read().unwrap().dispatch_calls
    }
}

#[async_trait]
impl ShippingTasks for StubShippingTasks {
    async fn prepare_package(&self, _order: &OrderContext) -> Result<String, TaskError> {
        let mut state = self.state.write().unwrap();
        state.prepare_calls += 1;
        if state.prepare_failures > 0 {
            state.prepare_failures -= 1;
            return Err(TaskError::new("warehouse unavailable"));
        }
        Ok("Package ready".to_string())
    }

    async fn dispatch_carrier(&self, _order: &OrderContext) -> Result<String, TaskError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.dispatch_calls += 1;
            if state.dispatch_failures > 0 {
                state.dispatch_failures -= 1;
                return Err(TaskError::new("carrier rejected pickup"));
            }
            state.dispatch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok("Dispatched".to_string())
    }
}
