//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::config::Config;
use common::PaymentId;
use ledger::{InMemoryLedger, PaymentLedger, PaymentStatus};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> (Router, InMemoryLedger) {
    let ledger = InMemoryLedger::new();
    let state = api::create_app_state(Arc::new(ledger.clone()), &Config::default()).await;
    let app = api::create_app(state, get_metrics_handle());
    (app, ledger)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn wait_for_step(app: &Router, order: &str, step: &str) -> Value {
    for _ in 0..300 {
        let (status, body) = send(app, "GET", &format!("/orders/{order}/status"), None).await;
        if status == StatusCode::OK && body["step"] == step {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order {order} never reached step {step}");
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_start_returns_instance_id() {
    let (app, _) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/orders/42/start",
        Some(json!({"payment_id": "pay-42", "address": {"city": "Amherst"}})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["instance_id"], "order-42");
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let (app, ledger) = setup().await;

    let (status, _) = send(
        &app,
        "POST",
        "/orders/42/start",
        Some(json!({"payment_id": "pay-42", "address": {"city": "Amherst"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    wait_for_step(&app, "42", "manual_review").await;

    let (status, body) = send(
        &app,
        "POST",
        "/orders/42/signals/update_address",
        Some(json!({"address": {"city": "Boston", "street": "456 Elm Ave"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["path"], "signal");

    let (status, body) = send(&app, "POST", "/orders/42/signals/approve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let done = wait_for_step(&app, "42", "done").await;
    assert_eq!(done["approved"], true);
    assert_eq!(done["canceled"], false);
    assert_eq!(done["address"]["city"], "Boston");
    assert_eq!(done["address"]["street"], "456 Elm Ave");

    let (status, events) = send(&app, "GET", "/orders/42/events", None).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "payment_charged");
    assert_eq!(events[0]["payload"]["amount"], 2);
    assert!(events[0]["recorded_at"].as_str().is_some());

    let record = ledger
        .get_payment(&PaymentId::new("pay-42"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Charged);
    assert_eq!(record.amount, Some(2));
}

#[tokio::test]
async fn test_status_of_unknown_order_is_404() {
    let (app, _) = setup().await;

    let (status, body) = send(&app, "GET", "/orders/ghost/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_approve_unknown_order_bootstraps() {
    let (app, _) = setup().await;

    let (status, body) = send(&app, "POST", "/orders/77/signals/approve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["path"], "start_then_signal");
    assert!(body["attempts"].as_u64().unwrap() >= 1);

    // The bootstrapped saga has its approval latched and runs through.
    wait_for_step(&app, "77", "done").await;
}

#[tokio::test]
async fn test_double_start_conflicts() {
    let (app, _) = setup().await;

    let body = json!({"payment_id": "pay-43", "address": {}});
    let (status, _) = send(&app, "POST", "/orders/43/start", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = send(&app, "POST", "/orders/43/start", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["error"].as_str().is_some());
}

#[tokio::test]
async fn test_cancel_over_http() {
    let (app, _) = setup().await;

    send(
        &app,
        "POST",
        "/orders/45/start",
        Some(json!({"payment_id": "pay-45"})),
    )
    .await;
    wait_for_step(&app, "45", "manual_review").await;

    let (status, body) = send(&app, "POST", "/orders/45/signals/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    for _ in 0..300 {
        let (_, snapshot) = send(&app, "GET", "/orders/45/status", None).await;
        if snapshot["canceled"] == true {
            assert_eq!(snapshot["step"], "manual_review");
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order 45 never observed the cancel");
}

#[tokio::test]
async fn test_malformed_address_patch_is_ignored() {
    let (app, _) = setup().await;

    send(
        &app,
        "POST",
        "/orders/44/start",
        Some(json!({"payment_id": "pay-44", "address": {"city": "Amherst"}})),
    )
    .await;
    wait_for_step(&app, "44", "manual_review").await;

    let (status, body) = send(
        &app,
        "POST",
        "/orders/44/signals/update_address",
        Some(json!({"address": "Boston"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    send(&app, "POST", "/orders/44/signals/approve", None).await;
    let done = wait_for_step(&app, "44", "done").await;
    assert_eq!(done["address"], json!({"city": "Amherst"}));
}

#[tokio::test]
async fn test_demo_run() {
    let (app, _) = setup().await;

    let (status, body) = send(&app, "POST", "/demo/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "done");
    assert!(
        body["instance_id"]
            .as_str()
            .unwrap()
            .starts_with("order-demo-")
    );
}
