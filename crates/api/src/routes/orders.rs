//! Order saga endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::{Address, OrderId, PaymentId};
use ledger::PaymentLedger;
use saga::{SagaClient, SignalDelivery, StatusSnapshot};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: PaymentLedger> {
    pub client: SagaClient,
    pub ledger: Arc<L>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartOrderRequest {
    pub payment_id: String,
    #[serde(default)]
    pub address: Address,
}

#[derive(Deserialize)]
pub struct AddressPatchRequest {
    /// Arbitrary JSON: a malformed patch is delivered and ignored by
    /// the saga rather than rejected at the door.
    #[serde(default)]
    pub address: Value,
}

// -- Response types --

#[derive(Serialize)]
pub struct StartOrderResponse {
    pub instance_id: String,
}

#[derive(Serialize)]
pub struct SignalResponse {
    pub ok: bool,
    pub path: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl From<SignalDelivery> for SignalResponse {
    fn from(delivery: SignalDelivery) -> Self {
        match delivery {
            SignalDelivery::Direct => SignalResponse {
                ok: true,
                path: "signal",
                attempts: None,
            },
            SignalDelivery::AfterBootstrap { attempts } => SignalResponse {
                ok: true,
                path: "start_then_signal",
                attempts: Some(attempts),
            },
        }
    }
}

#[derive(Serialize)]
pub struct AuditEventResponse {
    pub order_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub recorded_at: String,
}

#[derive(Serialize)]
pub struct DemoRunResponse {
    pub instance_id: String,
    pub result: Value,
}

// -- Handlers --

/// POST /orders/:id/start — start the fulfillment saga for an order.
#[tracing::instrument(skip(state, req))]
pub async fn start<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<StartOrderRequest>,
) -> Result<(StatusCode, Json<StartOrderResponse>), ApiError> {
    let order_id = OrderId::new(id);
    let payment_id = PaymentId::new(req.payment_id);

    let instance_id = state
        .client
        .start_order(&order_id, &payment_id, req.address)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartOrderResponse {
            instance_id: instance_id.to_string(),
        }),
    ))
}

/// POST /orders/:id/signals/approve — release the order from review.
#[tracing::instrument(skip(state))]
pub async fn approve<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<SignalResponse>, ApiError> {
    let delivery = state.client.approve(&OrderId::new(id)).await?;
    Ok(Json(delivery.into()))
}

/// POST /orders/:id/signals/cancel — cancel the order in review.
#[tracing::instrument(skip(state))]
pub async fn cancel<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<SignalResponse>, ApiError> {
    let delivery = state.client.cancel(&OrderId::new(id)).await?;
    Ok(Json(delivery.into()))
}

/// POST /orders/:id/signals/update_address — merge an address patch.
#[tracing::instrument(skip(state, req))]
pub async fn update_address<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    Json(req): Json<AddressPatchRequest>,
) -> Result<Json<SignalResponse>, ApiError> {
    let delivery = state
        .client
        .update_address(&OrderId::new(id), req.address)
        .await?;
    Ok(Json(delivery.into()))
}

/// GET /orders/:id/status — last snapshot the saga published.
#[tracing::instrument(skip(state))]
pub async fn status<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let snapshot = state.client.status(&OrderId::new(id)).await?;
    Ok(Json(snapshot))
}

/// GET /orders/:id/events — audit trail recorded for the order.
#[tracing::instrument(skip(state))]
pub async fn events<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEventResponse>>, ApiError> {
    let order_id = OrderId::new(id);
    let events = state.ledger.events_for_order(&order_id).await?;

    let responses: Vec<AuditEventResponse> = events
        .into_iter()
        .map(|event| AuditEventResponse {
            order_id: event.order_id.to_string(),
            event_type: event.event_type,
            payload: event.payload,
            recorded_at: event.recorded_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(responses))
}

/// POST /demo/run — scripted end-to-end run of one demo order.
///
/// Starts a fresh order, waits long enough for it to park in manual
/// review, approves it and returns the saga's result.
#[tracing::instrument(skip(state))]
pub async fn run_demo<L: PaymentLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<DemoRunResponse>, ApiError> {
    let order_id = OrderId::new(format!("demo-{}", uuid::Uuid::new_v4().simple()));
    let payment_id = PaymentId::new(format!("pay-{order_id}"));
    let address: Address = [("city".to_string(), "Amherst".to_string())]
        .into_iter()
        .collect();

    let instance_id = state
        .client
        .start_order(&order_id, &payment_id, address)
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    state.client.approve(&order_id).await?;
    let result = state.client.await_completion(&order_id).await?;

    Ok(Json(DemoRunResponse {
        instance_id: instance_id.to_string(),
        result,
    }))
}
