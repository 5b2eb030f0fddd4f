//! Order fulfillment sagas.
//!
//! The order saga drives one order from intake through manual review,
//! an idempotent payment charge and a child shipping saga, folding
//! operator signals into its state between steps. The shipping child
//! escalates dispatch failures back to the parent, which grants at most
//! one full retry. [`SagaClient`] is the front door: it derives
//! instance ids from order keys and carries the delivery protocol for
//! signals that race the start of their target.

pub mod charge;
pub mod client;
pub mod error;
pub mod order;
pub mod shipping;
pub mod signals;
pub mod state;
pub mod tasks;

pub use charge::{ChargeReceipt, charge_once};
pub use client::{ClientConfig, SagaClient, SignalDelivery};
pub use error::{ClientError, ClientResult, Result, SagaError, TaskError};
pub use order::{OrderSaga, OrderSagaInput};
pub use shipping::{ShippingInput, ShippingSaga};
pub use signals::OrderSignal;
pub use state::{OrderSagaState, OrderStep, StatusSnapshot};
pub use tasks::{ChargeAuthorization, OrderTasks, ShippingTasks, StubOrderTasks, StubShippingTasks};
