//! Saga error types.

use thiserror::Error;

use common::PaymentId;
use ledger::LedgerError;
use runtime::{InstanceId, RuntimeError};

/// Failure reported by an external task.
///
/// Tasks are collaborators behind a trait, so all that crosses the
/// boundary is text. Whether a failure is transient is the retry
/// policy's business, not the error's.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while executing saga steps.
#[derive(Debug, Error)]
pub enum SagaError {
    /// An external task failed.
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// The ledger accepted a claim earlier but the row has vanished.
    #[error("Payment record missing after claim: {0}")]
    PaymentRecordMissing(PaymentId),

    /// Ledger error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors surfaced by the saga client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The instance never became visible within the delivery budget.
    /// Distinct from a plain not-found: the client already tried to
    /// bootstrap the instance and kept retrying.
    #[error("instance {instance} not visible after {attempts} delivery attempts")]
    NotVisibleAfterRetries { instance: InstanceId, attempts: u32 },

    /// Runtime error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for client results.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
