use std::time::Duration;

use thiserror::Error;

use crate::instance::InstanceId;
use crate::step::StepError;

/// Errors surfaced to callers driving instances from outside.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No instance with this id is visible to signals or queries.
    #[error("Instance not found: {0}")]
    NotFound(InstanceId),

    /// An instance with this id is still running.
    #[error("Instance already exists: {0}")]
    AlreadyExists(InstanceId),

    /// No workflow registered under this name.
    #[error("Workflow not registered: {0}")]
    WorkflowNotRegistered(String),

    /// The instance finished with a failure.
    #[error("Instance {instance} failed: {message}")]
    Failed {
        instance: InstanceId,
        message: String,
    },
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Terminal failure reported by a workflow run.
///
/// Carries only a message: by the time a run fails, the interesting
/// structure (which step, how many attempts) has already been folded
/// into the text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RunFailure {
    message: String,
}

impl RunFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failure recorded when an instance overruns its run deadline.
    pub fn deadline(limit: Duration) -> Self {
        Self::new(format!("run deadline of {:?} exceeded", limit))
    }
}

impl From<StepError> for RunFailure {
    fn from(err: StepError) -> Self {
        Self::new(err.to_string())
    }
}
