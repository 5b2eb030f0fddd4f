//! Idempotent charge flow.

use serde_json::json;
use tracing::info;

use common::{OrderContext, PaymentId};
use ledger::{PaymentLedger, PaymentStatus};

use crate::error::SagaError;
use crate::tasks::{ChargeAuthorization, OrderTasks};

/// Outcome of the charge step.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeReceipt {
    pub status: PaymentStatus,
    pub amount: i64,
}

/// Charges an order at most once per payment id.
///
/// The ledger claim decides everything. The winner calls the gateway,
/// records the amount and appends the audit event; every later call
/// replays the stored row without touching the gateway. A replayed
/// claim whose charge never completed therefore reports `created` with
/// amount 0, and that is the correct answer: the money never moved.
pub async fn charge_once<L, T>(
    ledger: &L,
    tasks: &T,
    order: &OrderContext,
    payment_id: &PaymentId,
) -> Result<ChargeReceipt, SagaError>
where
    L: PaymentLedger + ?Sized,
    T: OrderTasks + ?Sized,
{
    let created = ledger
        .try_create_payment(payment_id, &order.order_id)
        .await?;

    if !created {
        let record = ledger
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| SagaError::PaymentRecordMissing(payment_id.clone()))?;
        metrics::counter!("payments_replayed_total").increment(1);
        return Ok(ChargeReceipt {
            status: record.status,
            amount: record.amount.unwrap_or(0),
        });
    }

    let ChargeAuthorization { amount } = tasks.charge_payment(order, payment_id).await?;
    let amount = amount.unwrap_or(0).max(0);

    ledger.mark_charged(payment_id, amount).await?;
    ledger
        .append_event(&order.order_id, "payment_charged", json!({ "amount": amount }))
        .await?;
    metrics::counter!("payments_charged_total").increment(1);
    info!(payment_id = %payment_id, amount, "payment charged");

    Ok(ChargeReceipt {
        status: PaymentStatus::Charged,
        amount,
    })
}
