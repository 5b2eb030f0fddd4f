use thiserror::Error;

use common::PaymentId;

/// Errors that can occur when interacting with the payment ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The payment id was never claimed, so there is no row to update.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A stored status column held text that no known status maps to.
    #[error("Unknown payment status: {0}")]
    UnknownStatus(String),

    /// The backend refused the call. Raised by in-memory fault injection.
    #[error("Ledger unavailable: {0}")]
    Unavailable(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
