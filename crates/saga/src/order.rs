//! Parent order saga.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use common::{Address, OrderContext, OrderId, PaymentId};
use ledger::PaymentLedger;
use runtime::{
    DEFAULT_RUN_DEADLINE, InstanceContext, RunFailure, StartOptions, StepOptions, Workflow,
    execute_step,
};

use crate::charge::charge_once;
use crate::shipping::{self, ShippingInput};
use crate::state::{OrderSagaState, OrderStep};
use crate::tasks::OrderTasks;

/// Name the order saga registers under.
pub const WORKFLOW_NAME: &str = "order-saga";

pub const STEP_RECEIVE_ORDER: &str = "receive_order";
pub const STEP_VALIDATE_ORDER: &str = "validate_order";
pub const STEP_CHARGE_PAYMENT: &str = "charge_payment";

/// Input for one order saga instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSagaInput {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    #[serde(default)]
    pub address: Address,
}

/// The parent fulfillment saga.
///
/// Drives receive, validate, manual review, charge and shipping for a
/// single order. Signals fold into local state at every step boundary;
/// the charge step is idempotent through the ledger; the shipping
/// child gets one escalation retry.
pub struct OrderSaga<T, L> {
    tasks: Arc<T>,
    ledger: Arc<L>,
    step_options: StepOptions,
    child_run_deadline: Duration,
}

impl<T, L> OrderSaga<T, L> {
    pub fn new(tasks: Arc<T>, ledger: Arc<L>) -> Self {
        Self {
            tasks,
            ledger,
            step_options: StepOptions::default(),
            child_run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }

    pub fn with_step_options(mut self, step_options: StepOptions) -> Self {
        self.step_options = step_options;
        self
    }

    pub fn with_child_run_deadline(mut self, deadline: Duration) -> Self {
        self.child_run_deadline = deadline;
        self
    }
}

fn drain_into(ctx: &mut InstanceContext, state: &mut OrderSagaState) {
    for signal in ctx.poll_signals() {
        state.apply(&signal);
    }
}

#[async_trait]
impl<T, L> Workflow for OrderSaga<T, L>
where
    T: OrderTasks + 'static,
    L: PaymentLedger + 'static,
{
    async fn run(&self, ctx: &mut InstanceContext, input: Value) -> Result<Value, RunFailure> {
        let input: OrderSagaInput = serde_json::from_value(input)
            .map_err(|err| RunFailure::new(format!("invalid order input: {err}")))?;

        let mut state = OrderSagaState::new(input.address.clone());
        ctx.publish_status(state.status_json());

        drain_into(ctx, &mut state);
        state.advance(OrderStep::Receive);
        ctx.publish_status(state.status_json());
        let items = {
            let tasks = self.tasks.clone();
            let order_id = input.order_id.clone();
            execute_step(STEP_RECEIVE_ORDER, &self.step_options, move || {
                let tasks = tasks.clone();
                let order_id = order_id.clone();
                async move { tasks.receive_order(&order_id).await }
            })
            .await?
        };

        drain_into(ctx, &mut state);
        state.advance(OrderStep::Validate);
        ctx.publish_status(state.status_json());
        let order =
            OrderContext::new(input.order_id.clone(), items).with_address(state.address().clone());
        {
            let tasks = self.tasks.clone();
            let order = order.clone();
            execute_step(STEP_VALIDATE_ORDER, &self.step_options, move || {
                let tasks = tasks.clone();
                let order = order.clone();
                async move { tasks.validate_order(&order).await }
            })
            .await?;
        }

        drain_into(ctx, &mut state);
        state.advance(OrderStep::ManualReview);
        ctx.publish_status(state.status_json());
        // The only unbounded wait in the saga; the run deadline still
        // covers it.
        while !state.approved() && !state.canceled() {
            let Some(signal) = ctx.next_signal().await else {
                return Err(RunFailure::new("signal channel closed during review"));
            };
            state.apply(&signal);
            ctx.publish_status(state.status_json());
        }
        if state.canceled() {
            info!(order_id = %input.order_id, "order canceled in review");
            metrics::counter!("orders_canceled_total").increment(1);
            return Err(RunFailure::new("canceled in review"));
        }

        drain_into(ctx, &mut state);
        state.advance(OrderStep::Charge);
        ctx.publish_status(state.status_json());
        // Refresh the address so patches applied during review make it
        // onto the charge.
        let order = order.with_address(state.address().clone());
        let receipt = {
            let tasks = self.tasks.clone();
            let ledger = self.ledger.clone();
            let order = order.clone();
            let payment_id = input.payment_id.clone();
            execute_step(STEP_CHARGE_PAYMENT, &self.step_options, move || {
                let tasks = tasks.clone();
                let ledger = ledger.clone();
                let order = order.clone();
                let payment_id = payment_id.clone();
                async move {
                    charge_once(ledger.as_ref(), tasks.as_ref(), &order, &payment_id).await
                }
            })
            .await?
        };
        info!(
            order_id = %input.order_id,
            amount = receipt.amount,
            status = %receipt.status,
            "charge settled"
        );

        drain_into(ctx, &mut state);
        state.advance(OrderStep::Ship);
        ctx.publish_status(state.status_json());
        // The child id is stable across the escalation retry so both
        // attempts are visibly the same delivery.
        let run_prefix: String = ctx.run_id().chars().take(6).collect();
        let child_id = format!("ship-{}-{}", input.order_id, run_prefix);
        let mut escalated = false;
        loop {
            let child_order = order.clone().with_address(state.address().clone());
            let child_input = serde_json::to_value(ShippingInput { order: child_order })
                .map_err(|err| RunFailure::new(format!("invalid shipping input: {err}")))?;
            let options =
                StartOptions::new(child_id.as_str(), shipping::WORKFLOW_NAME, child_input)
                    .with_run_deadline(self.child_run_deadline);

            match ctx.run_child(options).await {
                Ok(_) => break,
                Err(error) => {
                    drain_into(ctx, &mut state);
                    if state.dispatch_failure().is_some() && !escalated {
                        warn!(
                            order_id = %input.order_id,
                            %error,
                            "dispatch failed, retrying shipping once"
                        );
                        metrics::counter!("shipping_escalation_retries_total").increment(1);
                        state.clear_dispatch_failure();
                        escalated = true;
                        continue;
                    }
                    return Err(RunFailure::new(format!("shipping failed: {error}")));
                }
            }
        }

        drain_into(ctx, &mut state);
        state.advance(OrderStep::Done);
        ctx.publish_status(state.status_json());
        metrics::counter!("orders_completed_total").increment(1);
        Ok(json!("done"))
    }
}
