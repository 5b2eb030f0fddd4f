//! In-process saga runtime.
//!
//! Hosts named workflows and runs every started instance on its own
//! tokio task. The runtime fronts all interaction with running
//! instances: signal delivery, status queries, awaiting results and
//! parent/child links. Steps executed inside a run get per-attempt
//! timeouts and retry backoff from [`step::execute_step`].
//!
//! The runtime keeps everything in memory. Durability here means the
//! protocol shape (caller-chosen ids, duplicate-start detection,
//! buffered signal mailboxes, queryable terminal state), not surviving
//! a process restart.

pub mod context;
pub mod error;
pub mod host;
pub mod instance;
pub mod retry;
pub mod step;
pub mod workflow;

pub use context::InstanceContext;
pub use error::{Result, RunFailure, RuntimeError};
pub use host::{Runtime, RuntimeConfig};
pub use instance::{DEFAULT_RUN_DEADLINE, InstanceId, SignalEnvelope, StartOptions};
pub use retry::RetryPolicy;
pub use step::{StepError, StepOptions, execute_step};
pub use workflow::Workflow;
