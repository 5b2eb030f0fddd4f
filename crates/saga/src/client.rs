//! Front-door client for order sagas.
//!
//! Wraps the runtime behind order-keyed operations and carries the
//! delivery protocol for commands that may arrive before the target
//! instance exists or becomes routable.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use common::{Address, OrderId, PaymentId};
use runtime::{
    DEFAULT_RUN_DEADLINE, InstanceId, Runtime, RuntimeError, SignalEnvelope, StartOptions,
};

use crate::error::{ClientError, ClientResult};
use crate::order::{self, OrderSagaInput};
use crate::signals;
use crate::state::StatusSnapshot;

/// Client tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delivery attempts after a bootstrap start.
    pub signal_retry_attempts: u32,
    /// Pause between delivery attempts.
    pub signal_retry_delay: Duration,
    /// Run deadline for every instance this client starts.
    pub run_deadline: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            signal_retry_attempts: 18,
            signal_retry_delay: Duration::from_millis(200),
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }
}

/// How a command reached its instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The instance was already routable; one direct send sufficed.
    Direct,
    /// The client bootstrap-started the instance, then delivered on
    /// the given attempt.
    AfterBootstrap { attempts: u32 },
}

/// Order-keyed facade over the runtime.
///
/// Cloneable and cheap to share; all clones drive the same runtime.
#[derive(Clone)]
pub struct SagaClient {
    runtime: Runtime,
    config: ClientConfig,
}

impl SagaClient {
    pub fn new(runtime: Runtime) -> Self {
        Self::with_config(runtime, ClientConfig::default())
    }

    pub fn with_config(runtime: Runtime, config: ClientConfig) -> Self {
        Self { runtime, config }
    }

    /// Instance id every caller derives from the order key.
    pub fn instance_id(order_id: &OrderId) -> InstanceId {
        InstanceId::new(format!("order-{order_id}"))
    }

    /// Starts the saga for an order.
    pub async fn start_order(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        address: Address,
    ) -> ClientResult<InstanceId> {
        let id = Self::instance_id(order_id);
        let input = OrderSagaInput {
            order_id: order_id.clone(),
            payment_id: payment_id.clone(),
            address,
        };
        let options =
            StartOptions::new(id.clone(), order::WORKFLOW_NAME, serde_json::to_value(&input)?)
                .with_run_deadline(self.config.run_deadline);
        self.runtime.start_instance(options).await?;
        Ok(id)
    }

    /// Approves the order, releasing it from manual review.
    pub async fn approve(&self, order_id: &OrderId) -> ClientResult<SignalDelivery> {
        self.deliver(order_id, SignalEnvelope::bare(signals::APPROVE), "__approve_only__")
            .await
    }

    /// Cancels the order. Only effective while it waits in review.
    pub async fn cancel(&self, order_id: &OrderId) -> ClientResult<SignalDelivery> {
        self.deliver(order_id, SignalEnvelope::bare(signals::CANCEL), "__cancel_only__")
            .await
    }

    /// Merges a patch into the order's shipping address.
    ///
    /// The patch travels as-is; the saga ignores entries it cannot use,
    /// so a malformed patch is delivered rather than rejected here.
    pub async fn update_address(
        &self,
        order_id: &OrderId,
        patch: Value,
    ) -> ClientResult<SignalDelivery> {
        self.deliver(
            order_id,
            SignalEnvelope::new(signals::UPDATE_ADDRESS, patch),
            "__update_only__",
        )
        .await
    }

    /// Last status snapshot the saga published.
    pub async fn status(&self, order_id: &OrderId) -> ClientResult<StatusSnapshot> {
        let id = Self::instance_id(order_id);
        let value = self.runtime.query_status(&id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Waits for the saga to terminate and returns its result.
    pub async fn await_completion(&self, order_id: &OrderId) -> ClientResult<Value> {
        let id = Self::instance_id(order_id);
        Ok(self.runtime.await_result(&id).await?)
    }

    /// Delivers one command, bootstrapping the instance if needed.
    ///
    /// Start acknowledgement and signal routability are not atomic: an
    /// instance started moments ago, by us or by a racing caller, can
    /// still answer not-found. The bounded retry loop absorbs that
    /// window. Any error other than not-found surfaces immediately.
    async fn deliver(
        &self,
        order_id: &OrderId,
        signal: SignalEnvelope,
        sentinel_payment: &str,
    ) -> ClientResult<SignalDelivery> {
        let id = Self::instance_id(order_id);

        match self.runtime.signal_instance(&id, signal.clone()).await {
            Ok(()) => return Ok(SignalDelivery::Direct),
            Err(RuntimeError::NotFound(_)) => {}
            Err(error) => return Err(error.into()),
        }

        // No routable instance. Start one whose input marks it as a
        // signal-only bootstrap; a racing real start may still win.
        let input = OrderSagaInput {
            order_id: order_id.clone(),
            payment_id: PaymentId::new(sentinel_payment),
            address: Address::new(),
        };
        let options =
            StartOptions::new(id.clone(), order::WORKFLOW_NAME, serde_json::to_value(&input)?)
                .with_run_deadline(self.config.run_deadline);
        match self.runtime.start_instance(options).await {
            Ok(()) => {
                metrics::counter!("client_bootstrap_starts_total").increment(1);
                debug!(instance = %id, signal = %signal.name, "bootstrap-started instance");
            }
            Err(RuntimeError::AlreadyExists(_)) => {}
            Err(error) => return Err(error.into()),
        }

        for attempt in 1..=self.config.signal_retry_attempts {
            match self.runtime.signal_instance(&id, signal.clone()).await {
                Ok(()) => return Ok(SignalDelivery::AfterBootstrap { attempts: attempt }),
                Err(RuntimeError::NotFound(_)) => {
                    tokio::time::sleep(self.config.signal_retry_delay).await;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ClientError::NotVisibleAfterRetries {
            instance: id,
            attempts: self.config.signal_retry_attempts,
        })
    }
}
