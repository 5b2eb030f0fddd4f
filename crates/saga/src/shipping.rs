//! Child shipping saga.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use common::OrderContext;
use runtime::{
    InstanceContext, RunFailure, SignalEnvelope, StepError, StepOptions, Workflow, execute_step,
};

use crate::signals;
use crate::tasks::ShippingTasks;

/// Name the shipping saga registers under.
pub const WORKFLOW_NAME: &str = "shipping-saga";

pub const STEP_PREPARE_PACKAGE: &str = "prepare_package";
pub const STEP_DISPATCH_CARRIER: &str = "dispatch_carrier";

/// Input for one shipping saga instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInput {
    pub order: OrderContext,
}

/// The child delivery saga.
///
/// Prepares the package, then hands it to the carrier. When either step
/// exhausts its attempts the failure is escalated to the parent as a
/// `dispatch_failed` signal before this instance terminates; whether the
/// delivery gets another run is the parent's call, not the child's.
pub struct ShippingSaga<T> {
    tasks: Arc<T>,
    step_options: StepOptions,
}

impl<T> ShippingSaga<T> {
    pub fn new(tasks: Arc<T>) -> Self {
        Self {
            tasks,
            step_options: StepOptions::default(),
        }
    }

    pub fn with_step_options(mut self, step_options: StepOptions) -> Self {
        self.step_options = step_options;
        self
    }
}

impl<T> ShippingSaga<T>
where
    T: ShippingTasks + 'static,
{
    async fn deliver(&self, order: &OrderContext) -> Result<(), StepError> {
        let prepared = {
            let tasks = self.tasks.clone();
            let order = order.clone();
            execute_step(STEP_PREPARE_PACKAGE, &self.step_options, move || {
                let tasks = tasks.clone();
                let order = order.clone();
                async move { tasks.prepare_package(&order).await }
            })
            .await?
        };
        info!(order_id = %order.order_id, status = %prepared, "package prepared");

        let dispatched = {
            let tasks = self.tasks.clone();
            let order = order.clone();
            execute_step(STEP_DISPATCH_CARRIER, &self.step_options, move || {
                let tasks = tasks.clone();
                let order = order.clone();
                async move { tasks.dispatch_carrier(&order).await }
            })
            .await?
        };
        info!(order_id = %order.order_id, status = %dispatched, "carrier dispatched");

        Ok(())
    }

    /// Reports the failure to whoever started this instance.
    ///
    /// An instance without a parent has nobody to tell and just
    /// terminates. Losing the escalation must not mask the failure
    /// itself, so a delivery error here is logged and swallowed.
    async fn escalate(&self, ctx: &InstanceContext, failure: &StepError) {
        let Some(parent) = ctx.parent() else {
            return;
        };
        metrics::counter!("shipping_escalations_total").increment(1);
        let signal = SignalEnvelope::new(signals::DISPATCH_FAILED, json!(failure.to_string()));
        if let Err(error) = ctx.signal_external(parent, signal).await {
            warn!(%parent, %error, "could not escalate dispatch failure");
        }
    }
}

#[async_trait]
impl<T> Workflow for ShippingSaga<T>
where
    T: ShippingTasks + 'static,
{
    async fn run(&self, ctx: &mut InstanceContext, input: Value) -> Result<Value, RunFailure> {
        let input: ShippingInput = serde_json::from_value(input)
            .map_err(|err| RunFailure::new(format!("invalid shipping input: {err}")))?;

        if let Err(failure) = self.deliver(&input.order).await {
            self.escalate(ctx, &failure).await;
            return Err(failure.into());
        }

        Ok(json!("ok"))
    }
}
