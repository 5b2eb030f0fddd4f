//! Order saga state machine.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use common::Address;
use runtime::SignalEnvelope;

use crate::signals::OrderSignal;

/// Where an order is in its fulfillment flow.
///
/// Steps only ever advance:
/// ```text
/// init ──► receive ──► validate ──► manual_review ──► charge ──► ship ──► done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStep {
    #[default]
    Init,
    Receive,
    Validate,
    ManualReview,
    Charge,
    Ship,
    Done,
}

impl OrderStep {
    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStep::Init => "init",
            OrderStep::Receive => "receive",
            OrderStep::Validate => "validate",
            OrderStep::ManualReview => "manual_review",
            OrderStep::Charge => "charge",
            OrderStep::Ship => "ship",
            OrderStep::Done => "done",
        }
    }

    /// Returns true if no further step follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStep::Done)
    }
}

impl std::fmt::Display for OrderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable state of one order saga run.
///
/// Signals fold into this between steps. `approved` and `canceled`
/// latch once set; address patches merge key by key; the step advances
/// only from the saga's own control flow.
#[derive(Debug, Clone)]
pub struct OrderSagaState {
    approved: bool,
    canceled: bool,
    dispatch_fail_reason: Option<String>,
    step: OrderStep,
    address: Address,
}

impl OrderSagaState {
    pub fn new(address: Address) -> Self {
        Self {
            approved: false,
            canceled: false,
            dispatch_fail_reason: None,
            step: OrderStep::Init,
            address,
        }
    }

    /// Folds one signal into the state. Signals the saga does not
    /// understand are ignored.
    pub fn apply(&mut self, signal: &SignalEnvelope) {
        match OrderSignal::parse(signal) {
            Some(OrderSignal::Approve) => self.approved = true,
            Some(OrderSignal::Cancel) => self.canceled = true,
            Some(OrderSignal::UpdateAddress(patch)) => self.address.merge(patch),
            Some(OrderSignal::DispatchFailed(reason)) => {
                self.dispatch_fail_reason = Some(reason);
            }
            None => {}
        }
    }

    /// Moves the saga to its next step.
    pub fn advance(&mut self, step: OrderStep) {
        self.step = step;
    }

    pub fn step(&self) -> OrderStep {
        self.step
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn canceled(&self) -> bool {
        self.canceled
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Escalated reason from the shipping child, if one arrived.
    pub fn dispatch_failure(&self) -> Option<&str> {
        self.dispatch_fail_reason.as_deref()
    }

    /// Consumes the escalation so a later failure reads as fresh.
    pub fn clear_dispatch_failure(&mut self) {
        self.dispatch_fail_reason = None;
    }

    /// Snapshot served to status queries.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            approved: self.approved,
            canceled: self.canceled,
            step: self.step,
            address: self.address.clone(),
        }
    }

    /// Snapshot in the JSON shape published to the runtime.
    pub fn status_json(&self) -> Value {
        json!({
            "approved": self.approved,
            "canceled": self.canceled,
            "step": self.step,
            "address": self.address,
        })
    }
}

/// What a status query returns.
///
/// Every field defaults so the snapshot also deserializes from the
/// empty object an instance reports before its first publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub step: OrderStep,
    #[serde(default)]
    pub address: Address,
}
