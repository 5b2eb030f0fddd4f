//! HTTP front door for the order fulfillment sagas.
//!
//! Provides REST endpoints to start an order saga, signal it through
//! manual review, query its status and read its audit trail, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ledger::PaymentLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: PaymentLedger + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders/{id}/start", post(routes::orders::start::<L>))
        .route(
            "/orders/{id}/signals/approve",
            post(routes::orders::approve::<L>),
        )
        .route(
            "/orders/{id}/signals/cancel",
            post(routes::orders::cancel::<L>),
        )
        .route(
            "/orders/{id}/signals/update_address",
            post(routes::orders::update_address::<L>),
        )
        .route("/orders/{id}/status", get(routes::orders::status::<L>))
        .route("/orders/{id}/events", get(routes::orders::events::<L>))
        .route("/demo/run", post(routes::orders::run_demo::<L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a runtime over the given ledger, registers both sagas with
/// stub external tasks and returns the shared state for [`create_app`].
pub async fn create_app_state<L: PaymentLedger + 'static>(
    ledger: Arc<L>,
    config: &Config,
) -> Arc<AppState<L>> {
    use common::LineItem;
    use runtime::Runtime;
    use saga::{OrderSaga, SagaClient, ShippingSaga, StubOrderTasks, StubShippingTasks};

    let runtime = Runtime::with_config(config.runtime_config());

    let order_tasks = Arc::new(StubOrderTasks::with_items(vec![
        LineItem::new("ABC", 1),
        LineItem::new("XYZ", 1),
    ]));
    let order_saga = OrderSaga::new(order_tasks, ledger.clone());
    runtime
        .register(saga::order::WORKFLOW_NAME, Arc::new(order_saga))
        .await;

    let shipping_saga = ShippingSaga::new(Arc::new(StubShippingTasks::new()));
    runtime
        .register(saga::shipping::WORKFLOW_NAME, Arc::new(shipping_saga))
        .await;

    let client = SagaClient::with_config(runtime, config.client_config());
    Arc::new(AppState { client, ledger })
}
