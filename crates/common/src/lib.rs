//! Shared domain types used across the order-fulfillment saga crates.

pub mod order;
pub mod types;

pub use order::{Address, LineItem, OrderContext};
pub use types::{OrderId, PaymentId};
