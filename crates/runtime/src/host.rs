use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use crate::context::InstanceContext;
use crate::error::{Result, RunFailure, RuntimeError};
use crate::instance::{InstanceId, SignalEnvelope, StartOptions};
use crate::workflow::Workflow;

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long after start an instance stays invisible to signals and
    /// queries. Zero in production; tests raise it to exercise callers
    /// that have to retry until the instance becomes visible.
    pub signal_visibility_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            signal_visibility_delay: Duration::ZERO,
        }
    }
}

/// In-process saga runtime.
///
/// Hosts registered workflows and runs each instance on its own tokio
/// task. All interaction with a running instance goes through channels
/// held in the instance table: an unbounded mailbox for signals, one
/// watch for the status snapshot and one for the final outcome.
/// Terminal entries stay in the table so late signals, queries and
/// awaits keep working after the run ends.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    workflows: RwLock<HashMap<String, Arc<dyn Workflow>>>,
    instances: RwLock<HashMap<InstanceId, InstanceEntry>>,
    config: RuntimeConfig,
}

struct InstanceEntry {
    signals: mpsc::UnboundedSender<SignalEnvelope>,
    status: watch::Receiver<Value>,
    outcome: watch::Receiver<Option<std::result::Result<Value, RunFailure>>>,
    visible_at: Instant,
}

impl InstanceEntry {
    fn is_terminal(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    fn is_visible(&self) -> bool {
        Instant::now() >= self.visible_at
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                workflows: RwLock::new(HashMap::new()),
                instances: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Registers a workflow under a name. Later registrations replace
    /// earlier ones.
    pub async fn register(&self, name: impl Into<String>, workflow: Arc<dyn Workflow>) {
        self.inner
            .workflows
            .write()
            .await
            .insert(name.into(), workflow);
    }

    /// Starts a new top-level instance.
    ///
    /// Fails with `AlreadyExists` if an instance with this id is still
    /// running. A terminal instance's id may be reused; the old entry
    /// is replaced.
    pub async fn start_instance(&self, options: StartOptions) -> Result<()> {
        self.spawn_instance(options, None).await
    }

    pub(crate) async fn start_child(
        &self,
        options: StartOptions,
        parent: InstanceId,
    ) -> Result<()> {
        self.spawn_instance(options, Some(parent)).await
    }

    async fn spawn_instance(
        &self,
        options: StartOptions,
        parent: Option<InstanceId>,
    ) -> Result<()> {
        let StartOptions {
            id,
            workflow: workflow_name,
            input,
            run_deadline,
        } = options;

        let workflow = {
            let workflows = self.inner.workflows.read().await;
            workflows
                .get(&workflow_name)
                .cloned()
                .ok_or_else(|| RuntimeError::WorkflowNotRegistered(workflow_name.clone()))?
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Value::Object(serde_json::Map::new()));
        let (outcome_tx, outcome_rx) = watch::channel(None);

        {
            let mut instances = self.inner.instances.write().await;
            if let Some(existing) = instances.get(&id)
                && !existing.is_terminal()
            {
                return Err(RuntimeError::AlreadyExists(id));
            }
            instances.insert(
                id.clone(),
                InstanceEntry {
                    signals: signal_tx,
                    status: status_rx,
                    outcome: outcome_rx,
                    visible_at: Instant::now() + self.inner.config.signal_visibility_delay,
                },
            );
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let span = info_span!(
            "saga_instance",
            instance = %id,
            workflow = %workflow_name,
            run_id = %run_id,
        );

        let runtime = self.clone();
        tokio::spawn(
            async move {
                metrics::counter!("saga_instances_started_total").increment(1);
                let started = std::time::Instant::now();

                let mut ctx =
                    InstanceContext::new(id, run_id, parent, signal_rx, status_tx, runtime);

                let result =
                    match tokio::time::timeout(run_deadline, workflow.run(&mut ctx, input)).await {
                        Ok(result) => result,
                        Err(_) => Err(RunFailure::deadline(run_deadline)),
                    };

                metrics::histogram!("saga_instance_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                match &result {
                    Ok(_) => {
                        metrics::counter!("saga_instances_completed_total").increment(1);
                        debug!("instance completed");
                    }
                    Err(failure) => {
                        metrics::counter!("saga_instances_failed_total").increment(1);
                        debug!(error = %failure, "instance failed");
                    }
                }

                // Watch receivers in the instance table keep the entry
                // alive, so the send only fails if the runtime itself
                // was dropped.
                let _ = outcome_tx.send(Some(result));
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Delivers a signal to a visible instance.
    ///
    /// Unknown ids and instances still inside the visibility window get
    /// `NotFound`; callers treat that as "not yet" and retry or
    /// bootstrap a fresh instance. A signal to a terminal instance is
    /// dropped silently, matching what a live run does with signals it
    /// no longer cares about.
    pub async fn signal_instance(&self, id: &InstanceId, signal: SignalEnvelope) -> Result<()> {
        let instances = self.inner.instances.read().await;
        let entry = instances
            .get(id)
            .filter(|entry| entry.is_visible())
            .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;

        if entry.signals.send(signal).is_err() {
            debug!(instance = %id, "signal dropped, instance already terminal");
        }
        Ok(())
    }

    /// Returns the last status snapshot a visible instance published.
    ///
    /// An instance that has not published yet reports an empty object.
    pub async fn query_status(&self, id: &InstanceId) -> Result<Value> {
        let instances = self.inner.instances.read().await;
        let entry = instances
            .get(id)
            .filter(|entry| entry.is_visible())
            .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;
        Ok(entry.status.borrow().clone())
    }

    /// Waits until the instance terminates and returns its result.
    ///
    /// Not subject to the visibility window: whoever holds the id of an
    /// instance they just started may always await it.
    pub async fn await_result(&self, id: &InstanceId) -> Result<Value> {
        let mut outcome = {
            let instances = self.inner.instances.read().await;
            let entry = instances
                .get(id)
                .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;
            entry.outcome.clone()
        };

        let settled = outcome
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| RuntimeError::Failed {
                instance: id.clone(),
                message: "terminated without reporting an outcome".to_string(),
            })?;

        match settled.as_ref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(failure)) => Err(RuntimeError::Failed {
                instance: id.clone(),
                message: failure.message().to_string(),
            }),
            None => Err(RuntimeError::Failed {
                instance: id.clone(),
                message: "terminated without reporting an outcome".to_string(),
            }),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct Echo;

    #[async_trait]
    impl Workflow for Echo {
        async fn run(&self, _ctx: &mut InstanceContext, input: Value) -> std::result::Result<Value, RunFailure> {
            Ok(input)
        }
    }

    /// Publishes a status, then blocks until a "go" signal arrives and
    /// returns its payload.
    struct WaitForGo;

    #[async_trait]
    impl Workflow for WaitForGo {
        async fn run(&self, ctx: &mut InstanceContext, _input: Value) -> std::result::Result<Value, RunFailure> {
            ctx.publish_status(json!({"step": "waiting"}));
            loop {
                match ctx.next_signal().await {
                    Some(signal) if signal.name == "go" => return Ok(signal.payload),
                    Some(_) => continue,
                    None => return Err(RunFailure::new("mailbox closed")),
                }
            }
        }
    }

    /// Sleeps without publishing anything.
    struct Sleeper(Duration);

    #[async_trait]
    impl Workflow for Sleeper {
        async fn run(&self, _ctx: &mut InstanceContext, _input: Value) -> std::result::Result<Value, RunFailure> {
            tokio::time::sleep(self.0).await;
            Ok(json!("slept"))
        }
    }

    struct SpawnChild;

    #[async_trait]
    impl Workflow for SpawnChild {
        async fn run(&self, ctx: &mut InstanceContext, _input: Value) -> std::result::Result<Value, RunFailure> {
            let child_id = format!("{}-child", ctx.id());
            let options = StartOptions::new(child_id.as_str(), "report-parent", Value::Null);
            ctx.run_child(options)
                .await
                .map_err(|err| RunFailure::new(err.to_string()))
        }
    }

    struct ReportParent;

    #[async_trait]
    impl Workflow for ReportParent {
        async fn run(&self, ctx: &mut InstanceContext, _input: Value) -> std::result::Result<Value, RunFailure> {
            Ok(json!({ "parent": ctx.parent().map(InstanceId::to_string) }))
        }
    }

    async fn runtime_with(workflows: &[(&str, Arc<dyn Workflow>)]) -> Runtime {
        let runtime = Runtime::new();
        for (name, workflow) in workflows {
            runtime.register(*name, workflow.clone()).await;
        }
        runtime
    }

    #[tokio::test]
    async fn start_and_await_returns_result() {
        let runtime = runtime_with(&[("echo", Arc::new(Echo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "echo", json!({"hello": true})))
            .await
            .unwrap();

        let result = runtime.await_result(&id).await.unwrap();
        assert_eq!(result, json!({"hello": true}));
    }

    #[tokio::test]
    async fn unregistered_workflow_start_fails() {
        let runtime = Runtime::new();
        let result = runtime
            .start_instance(StartOptions::new("i-1", "nope", Value::Null))
            .await;
        assert!(matches!(
            result,
            Err(RuntimeError::WorkflowNotRegistered(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn duplicate_start_while_running_rejected() {
        let runtime = runtime_with(&[("wait", Arc::new(WaitForGo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await
            .unwrap();

        let second = runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await;
        assert!(matches!(second, Err(RuntimeError::AlreadyExists(_))));

        runtime
            .signal_instance(&id, SignalEnvelope::new("go", json!("done")))
            .await
            .unwrap();
        assert_eq!(runtime.await_result(&id).await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn terminal_id_may_be_reused() {
        let runtime = runtime_with(&[("echo", Arc::new(Echo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "echo", json!(1)))
            .await
            .unwrap();
        assert_eq!(runtime.await_result(&id).await.unwrap(), json!(1));

        runtime
            .start_instance(StartOptions::new("i-1", "echo", json!(2)))
            .await
            .unwrap();
        assert_eq!(runtime.await_result(&id).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn signal_unknown_instance_not_found() {
        let runtime = Runtime::new();
        let result = runtime
            .signal_instance(&InstanceId::new("ghost"), SignalEnvelope::bare("go"))
            .await;
        assert!(matches!(result, Err(RuntimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn signal_after_completion_is_dropped() {
        let runtime = runtime_with(&[("echo", Arc::new(Echo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "echo", Value::Null))
            .await
            .unwrap();
        runtime.await_result(&id).await.unwrap();

        // The entry is terminal but still present, so the signal is
        // accepted and silently discarded.
        runtime
            .signal_instance(&id, SignalEnvelope::bare("go"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn signal_sent_before_receive_is_buffered() {
        let runtime = runtime_with(&[("wait", Arc::new(WaitForGo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await
            .unwrap();
        runtime
            .signal_instance(&id, SignalEnvelope::new("go", json!(7)))
            .await
            .unwrap();

        assert_eq!(runtime.await_result(&id).await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn query_returns_last_published_status() {
        let runtime = runtime_with(&[("wait", Arc::new(WaitForGo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await
            .unwrap();

        let mut status = runtime.query_status(&id).await.unwrap();
        for _ in 0..50 {
            if status == json!({"step": "waiting"}) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = runtime.query_status(&id).await.unwrap();
        }
        assert_eq!(status, json!({"step": "waiting"}));

        runtime
            .signal_instance(&id, SignalEnvelope::new("go", Value::Null))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn query_after_termination_keeps_last_status() {
        let runtime = runtime_with(&[("wait", Arc::new(WaitForGo))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await
            .unwrap();
        runtime
            .signal_instance(&id, SignalEnvelope::new("go", Value::Null))
            .await
            .unwrap();
        runtime.await_result(&id).await.unwrap();

        assert_eq!(
            runtime.query_status(&id).await.unwrap(),
            json!({"step": "waiting"})
        );
    }

    #[tokio::test]
    async fn query_before_first_publish_is_empty_object() {
        let runtime =
            runtime_with(&[("sleep", Arc::new(Sleeper(Duration::from_millis(200))))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "sleep", Value::Null))
            .await
            .unwrap();

        assert_eq!(runtime.query_status(&id).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn run_deadline_terminates_instance() {
        let runtime = runtime_with(&[("sleep", Arc::new(Sleeper(Duration::from_secs(30))))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(
                StartOptions::new("i-1", "sleep", Value::Null)
                    .with_run_deadline(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        let result = runtime.await_result(&id).await;
        match result {
            Err(RuntimeError::Failed { message, .. }) => {
                assert!(message.contains("run deadline"), "got: {message}");
            }
            other => panic!("expected deadline failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn visibility_delay_gates_signals_and_queries() {
        let runtime = Runtime::with_config(RuntimeConfig {
            signal_visibility_delay: Duration::from_millis(150),
        });
        runtime.register("wait", Arc::new(WaitForGo)).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "wait", Value::Null))
            .await
            .unwrap();

        let early_signal = runtime
            .signal_instance(&id, SignalEnvelope::bare("go"))
            .await;
        assert!(matches!(early_signal, Err(RuntimeError::NotFound(_))));
        let early_query = runtime.query_status(&id).await;
        assert!(matches!(early_query, Err(RuntimeError::NotFound(_))));

        tokio::time::sleep(Duration::from_millis(200)).await;

        runtime
            .signal_instance(&id, SignalEnvelope::new("go", json!("late")))
            .await
            .unwrap();
        assert_eq!(runtime.await_result(&id).await.unwrap(), json!("late"));
    }

    #[tokio::test]
    async fn child_sees_parent_identity() {
        let runtime = runtime_with(&[
            ("spawn-child", Arc::new(SpawnChild) as Arc<dyn Workflow>),
            ("report-parent", Arc::new(ReportParent)),
        ])
        .await;
        let id = InstanceId::new("parent-1");

        runtime
            .start_instance(StartOptions::new("parent-1", "spawn-child", Value::Null))
            .await
            .unwrap();

        let result = runtime.await_result(&id).await.unwrap();
        assert_eq!(result, json!({"parent": "parent-1"}));
    }

    #[tokio::test]
    async fn top_level_instance_has_no_parent() {
        let runtime = runtime_with(&[("report-parent", Arc::new(ReportParent))]).await;
        let id = InstanceId::new("i-1");

        runtime
            .start_instance(StartOptions::new("i-1", "report-parent", Value::Null))
            .await
            .unwrap();

        let result = runtime.await_result(&id).await.unwrap();
        assert_eq!(result, json!({"parent": null}));
    }
}
