use async_trait::async_trait;
use serde_json::Value;

use common::{OrderId, PaymentId};

use crate::{AuditEvent, PaymentRecord, Result};

/// Core trait for payment ledger implementations.
///
/// The ledger is the idempotency barrier in front of the payment
/// gateway: a payment id must be claimed here before any money moves,
/// and the claim is a conditional insert that exactly one caller wins.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Claims a payment id for an order.
    ///
    /// Returns `true` if this call inserted the row, `false` if the id
    /// was already claimed earlier. Only the caller that gets `true`
    /// may talk to the payment gateway; everyone else reads the stored
    /// outcome instead.
    async fn try_create_payment(&self, payment_id: &PaymentId, order_id: &OrderId)
    -> Result<bool>;

    /// Fetches a payment row by id.
    ///
    /// Returns None if the id was never claimed.
    async fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>>;

    /// Marks a claimed payment as charged and records the captured amount.
    ///
    /// Fails with `PaymentNotFound` if the id was never claimed.
    async fn mark_charged(&self, payment_id: &PaymentId, amount: i64) -> Result<()>;

    /// Appends an entry to an order's audit trail.
    async fn append_event(
        &self,
        order_id: &OrderId,
        event_type: &str,
        payload: Value,
    ) -> Result<()>;

    /// Lists an order's audit trail in insertion order.
    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>>;
}
