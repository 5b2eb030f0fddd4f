//! Signal names and payloads understood by the order saga.

use serde_json::Value;
use tracing::debug;

use common::Address;
use runtime::SignalEnvelope;

/// Approves the order in manual review. No payload.
pub const APPROVE: &str = "approve";
/// Cancels the order in manual review. No payload.
pub const CANCEL: &str = "cancel";
/// Merges an address patch into the order. Payload: string map.
pub const UPDATE_ADDRESS: &str = "update_address";
/// Reports a child dispatch failure to the parent. Payload: reason text.
pub const DISPATCH_FAILED: &str = "dispatch_failed";

/// A decoded order signal.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSignal {
    Approve,
    Cancel,
    UpdateAddress(Address),
    DispatchFailed(String),
}

impl OrderSignal {
    /// Decodes an envelope.
    ///
    /// Unknown names and malformed payloads decode to None; a signal
    /// never fails the instance it lands on.
    pub fn parse(signal: &SignalEnvelope) -> Option<Self> {
        match signal.name.as_str() {
            APPROVE => Some(OrderSignal::Approve),
            CANCEL => Some(OrderSignal::Cancel),
            UPDATE_ADDRESS => match serde_json::from_value::<Address>(signal.payload.clone()) {
                Ok(patch) => Some(OrderSignal::UpdateAddress(patch)),
                Err(error) => {
                    debug!(%error, "ignoring malformed address patch");
                    None
                }
            },
            DISPATCH_FAILED => {
                let reason = match &signal.payload {
                    Value::String(reason) => reason.clone(),
                    other => other.to_string(),
                };
                Some(OrderSignal::DispatchFailed(reason))
            }
            _ => {
                debug!(name = %signal.name, "ignoring unknown signal");
                None
            }
        }
    }
}
