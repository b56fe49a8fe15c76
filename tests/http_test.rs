//! Integration tests for the HTTP router

mod common;

use bytes::Bytes;
use common::{seed_account, TEST_DB};
use coop_gateway::config::Args;
use coop_gateway::db::{MemoryStore, SharedStore};
use coop_gateway::server::{dispatch, AppState};
use http_body_util::BodyExt;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

fn state_with(store: Option<SharedStore>, args: Args) -> Arc<AppState> {
    Arc::new(AppState::new(args, store, None))
}

fn memory_state() -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(TEST_DB));
    let state = state_with(Some(Arc::clone(&store) as SharedStore), Args::default());
    (state, store)
}

async fn call(
    state: &Arc<AppState>,
    method: Method,
    path: &str,
    body: Value,
) -> (StatusCode, Value) {
    let bytes = Bytes::from(body.to_string());
    let response = dispatch(Arc::clone(state), method, path, None, bytes).await;
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (state, _) = memory_state();
    let (status, body) = call(&state, Method::GET, "/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");

    let (status, _) = call(&state, Method::GET, "/readyz", Value::Null).await;
    assert_eq!(status, StatusCode::OK);

    let detached = state_with(None, Args::default());
    let (status, body) = call(&detached, Method::GET, "/ready", Value::Null).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["store"], "none");

    let (status, body) = call(&state, Method::GET, "/version", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "coop-gateway");
}

#[tokio::test]
async fn test_create_then_get_over_http() {
    let (state, _) = memory_state();

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/loan/create",
        json!({
            "collection": "loan_applications",
            "data": {
                "memberid": "M-1",
                "requestamount": 12000,
                "interestrate": 12,
                "requestterm": 12
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["code"], 201);
    assert_eq!(body["message"], "Loan data created successfully");
    assert_eq!(body["installment_amount"], 1120.0);
    assert_eq!(body["total_payment"], 13440.0);
    assert!(body["inserted_id"].is_object());
    let application_id = body["application_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/loan/get",
        json!({ "collection": "loan_applications", "filter": { "applicationid": application_id } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["memberid"], "M-1");
}

#[tokio::test]
async fn test_update_and_delete_over_http() {
    let (state, _) = memory_state();
    call(
        &state,
        Method::POST,
        "/api/v1/loan/create",
        json!({
            "collection": "loan_tracking",
            "data": { "applicationid": "APP-1", "stage": "new" }
        }),
    )
    .await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/loan/update",
        json!({
            "collection": "loan_tracking",
            "filter": { "applicationid": "APP-1" },
            "data": { "stage": "review" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched_count"], 1);
    assert_eq!(body["modified_count"], 1);
    assert!(body["upserted_id"].is_null());

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/loan/delete",
        json!({ "collection": "loan_tracking", "filter": { "applicationid": "APP-1" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 1);
}

#[tokio::test]
async fn test_error_envelopes() {
    let (state, _) = memory_state();

    let response = dispatch(
        Arc::clone(&state),
        Method::POST,
        "/api/v1/loan/create",
        None,
        Bytes::from_static(b"{not json"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value =
        serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes()).unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "Invalid request body");

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/loan/get",
        json!({ "collection": "users", "filter": {} }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Collection not allowed");

    let (status, _) = call(&state, Method::GET, "/api/v1/unknown", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unavailable_store_answers_before_parsing() {
    let detached = state_with(None, Args::default());
    let response = dispatch(
        detached,
        Method::POST,
        "/api/v1/loan/update",
        None,
        Bytes::from_static(b"garbage"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_transfer_over_http() {
    let (state, store) = memory_state();
    seed_account(store.as_ref(), "SRC", "1234567890", "Somchai", "M-1", 500.0).await;
    seed_account(store.as_ref(), "DST", "9876543210", "Malee", "M-2", 0.0).await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/deposit/transfer",
        json!({
            "source_account_id": "SRC",
            "dest_account_id": "DST",
            "amount": 120,
            "description": "Loan share"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Transfer completed successfully");
    assert_eq!(body["slip_info"]["transaction_ref"], body["transaction_id"]);
    assert_eq!(body["slip_info"]["sender"]["account_no_masked"], "123-xxx-7890");
    assert!(body["slip_info"]["sender"].get("bank_code").is_none());
    assert_eq!(body["slip_info"]["receiver"]["bank_code"], "COOP");

    let (status, body) = call(
        &state,
        Method::POST,
        "/api/v1/deposit/transfer",
        json!({ "source_account_id": "SRC", "dest_account_id": "DST", "amount": 10000 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient balance");
}

#[tokio::test]
async fn test_cors_headers() {
    let args = Args {
        cors_origins: "https://app.coop.example, https://admin.coop.example".into(),
        ..Args::default()
    };
    let store: SharedStore = Arc::new(MemoryStore::new(TEST_DB));
    let state = state_with(Some(store), args);

    let response = dispatch(
        Arc::clone(&state),
        Method::OPTIONS,
        "/api/v1/loan/create",
        Some("https://admin.coop.example"),
        Bytes::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://admin.coop.example"
    );
    assert!(response.headers().contains_key("access-control-allow-methods"));

    let response = dispatch(
        state,
        Method::GET,
        "/health",
        Some("https://evil.example"),
        Bytes::new(),
    )
    .await;
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.coop.example"
    );
}
