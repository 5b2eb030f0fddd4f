//! Payment ledger and audit trail for the order fulfillment system.
//!
//! The ledger owns the single idempotency barrier in front of the
//! payment gateway. Claiming a payment id is a conditional insert that
//! exactly one caller wins; the winner charges, the losers read the
//! recorded outcome. The audit trail is a plain append-only table of
//! per-order events.
//!
//! Two backends: [`PostgresLedger`] for real deployments and
//! [`InMemoryLedger`] for local runs and tests.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use record::{AuditEvent, PaymentRecord, PaymentStatus};
pub use store::PaymentLedger;
