use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use common::{OrderId, PaymentId};

use crate::{
    AuditEvent, LedgerError, PaymentRecord, PaymentStatus, Result, store::PaymentLedger,
};

/// In-memory ledger backend.
///
/// Backs local runs without a database and most of the test suite. The
/// fault injection knobs make the next N calls to a write path fail,
/// which is how tests simulate an infrastructure outage mid-charge.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    payments: HashMap<PaymentId, PaymentRecord>,
    events: Vec<AuditEvent>,
    append_event_failures: u32,
    mark_charged_failures: u32,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payment rows currently held.
    pub async fn payment_count(&self) -> usize {
        self.inner.read().await.payments.len()
    }

    /// Number of audit events currently held.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    /// Makes the next `n` calls to `append_event` fail.
    pub async fn fail_append_events(&self, n: u32) {
        self.inner.write().await.append_event_failures = n;
    }

    /// Makes the next `n` calls to `mark_charged` fail.
    pub async fn fail_mark_charged(&self, n: u32) {
        self.inner.write().await.mark_charged_failures = n;
    }

    /// Drops all rows and resets fault injection.
    pub async fn clear(&self) {
        let mut tables = self.inner.write().await;
        tables.payments.clear();
        tables.events.clear();
        tables.append_event_failures = 0;
        tables.mark_charged_failures = 0;
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn try_create_payment(
        &self,
        payment_id: &PaymentId,
        order_id: &OrderId,
    ) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if tables.payments.contains_key(payment_id) {
            return Ok(false);
        }
        tables.payments.insert(
            payment_id.clone(),
            PaymentRecord {
                payment_id: payment_id.clone(),
                order_id: order_id.clone(),
                status: PaymentStatus::Created,
                amount: None,
            },
        );
        Ok(true)
    }

    async fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        let tables = self.inner.read().await;
        Ok(tables.payments.get(payment_id).cloned())
    }

    async fn mark_charged(&self, payment_id: &PaymentId, amount: i64) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.mark_charged_failures > 0 {
            tables.mark_charged_failures -= 1;
            return Err(LedgerError::Unavailable("mark_charged"));
        }
        let record = tables
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| LedgerError::PaymentNotFound(payment_id.clone()))?;
        record.status = PaymentStatus::Charged;
        record.amount = Some(amount);
        Ok(())
    }

    async fn append_event(
        &self,
        order_id: &OrderId,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.append_event_failures > 0 {
            tables.append_event_failures -= 1;
            return Err(LedgerError::Unavailable("append_event"));
        }
        tables.events.push(AuditEvent {
            order_id: order_id.clone(),
            event_type: event_type.to_string(),
            payload,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>> {
        let tables = self.inner.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| &e.order_id == order_id)
            .cloned()
            .collect())
    }
}
