use async_trait::async_trait;
use serde_json::Value;

use crate::context::InstanceContext;
use crate::error::RunFailure;

/// A workflow definition.
///
/// One registered value serves every instance of the workflow, so
/// implementations hold shared handles (task clients, ledgers) and keep
/// per-run state on the stack of `run`.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Drives one instance from start to finish.
    ///
    /// The context is the only way to observe signals, publish status
    /// or reach other instances; everything else the run needs arrives
    /// in `input`.
    async fn run(&self, ctx: &mut InstanceContext, input: Value) -> Result<Value, RunFailure>;
}
