//! External task traits and configurable stubs.
//!
//! Tasks are the side-effecting collaborators the sagas drive: the
//! order feed, the validator, the payment gateway, the warehouse and
//! the carrier. The stubs stand in for all of them with deterministic
//! failure and delay knobs so tests can script outages.

pub mod order;
pub mod shipping;

pub use order::{ChargeAuthorization, OrderTasks, StubOrderTasks};
pub use shipping::{ShippingTasks, StubShippingTasks};
