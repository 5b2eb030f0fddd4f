use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run deadline applied when the starter does not choose one.
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(15);

/// Identifier of a saga instance.
///
/// Ids are caller-chosen. That is what makes duplicate-start detection
/// and targeted signals possible: everyone who knows the business key
/// can derive the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A named message delivered to a running instance's mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub name: String,
    pub payload: Value,
}

impl SignalEnvelope {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Signal with no payload.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// How to start an instance.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub id: InstanceId,
    pub workflow: String,
    pub input: Value,
    pub run_deadline: Duration,
}

impl StartOptions {
    pub fn new(id: impl Into<InstanceId>, workflow: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            workflow: workflow.into(),
            input,
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }

    pub fn with_run_deadline(mut self, run_deadline: Duration) -> Self {
        self.run_deadline = run_deadline;
        self
    }
}
