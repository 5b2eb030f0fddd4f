use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::host::Runtime;
use crate::instance::{InstanceId, SignalEnvelope, StartOptions};

/// Execution context handed to a workflow run.
///
/// Owns the receive side of the instance's signal mailbox and the send
/// side of its status channel. The workflow task is the only consumer
/// of signals and the only writer of status, so neither needs a lock.
pub struct InstanceContext {
    id: InstanceId,
    run_id: String,
    parent: Option<InstanceId>,
    signals: mpsc::UnboundedReceiver<SignalEnvelope>,
    status: watch::Sender<Value>,
    runtime: Runtime,
}

impl InstanceContext {
    pub(crate) fn new(
        id: InstanceId,
        run_id: String,
        parent: Option<InstanceId>,
        signals: mpsc::UnboundedReceiver<SignalEnvelope>,
        status: watch::Sender<Value>,
        runtime: Runtime,
    ) -> Self {
        Self {
            id,
            run_id,
            parent,
            signals,
            status,
            runtime,
        }
    }

    /// Id of this instance.
    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Unique id of this run of the instance.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Id of the instance that started this one as a child, if any.
    pub fn parent(&self) -> Option<&InstanceId> {
        self.parent.as_ref()
    }

    /// Publishes a status snapshot for queries, replacing the previous one.
    pub fn publish_status(&self, status: Value) {
        // The receive side lives in the instance table and outlives this
        // run, so a failed send can only mean runtime teardown.
        let _ = self.status.send(status);
    }

    /// Drains every signal already in the mailbox without waiting.
    pub fn poll_signals(&mut self) -> Vec<SignalEnvelope> {
        let mut drained = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            drained.push(signal);
        }
        drained
    }

    /// Waits for the next signal.
    ///
    /// Returns None only if the mailbox has been closed, which means
    /// the runtime is tearing the instance down.
    pub async fn next_signal(&mut self) -> Option<SignalEnvelope> {
        self.signals.recv().await
    }

    /// Starts a child instance and waits for its result.
    ///
    /// The child sees this instance as its parent and may signal it
    /// back while still running. The child's own run deadline comes
    /// from `options`.
    pub async fn run_child(&self, options: StartOptions) -> Result<Value> {
        let child_id = options.id.clone();
        self.runtime.start_child(options, self.id.clone()).await?;
        self.runtime.await_result(&child_id).await
    }

    /// Sends a signal to another instance.
    pub async fn signal_external(
        &self,
        target: &InstanceId,
        signal: SignalEnvelope,
    ) -> Result<()> {
        self.runtime.signal_instance(target, signal).await
    }
}
