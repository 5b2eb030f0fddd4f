use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{OrderId, PaymentId};

/// Lifecycle of a payment row.
///
/// A row is born `Created` by the conditional insert that claims the
/// payment id. It moves to `Charged` exactly once, after the gateway
/// call succeeds. There is no third state: a claim whose charge never
/// completed stays `Created` forever and is what a replayed caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Charged,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Charged => "charged",
        }
    }

    /// Parses the text form stored in the database.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PaymentStatus::Created),
            "charged" => Some(PaymentStatus::Charged),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment row as stored in the ledger.
///
/// `amount` is None until the charge is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub amount: Option<i64>,
}

/// An entry in an order's append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
