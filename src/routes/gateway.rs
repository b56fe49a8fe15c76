//! Gateway verb handlers (/api/v1/loan/*)
//!
//! Each handler checks store availability before reading the body, so a
//! disconnected store answers 503 regardless of payload.

use bson::{Bson, Document};
use bytes::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::gateway::{CreateOutcome, CreateRequest, DeleteRequest, GetRequest, UpdateRequest};
use crate::routes::{error_response, json_response, parse_body, FullBody};
use crate::server::AppState;

fn to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

#[derive(Serialize)]
struct CreateResponse {
    status: &'static str,
    code: u16,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    inserted_id: Option<Value>,
    application_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    installment_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_payment: Option<f64>,
}

impl From<CreateOutcome> for CreateResponse {
    fn from(outcome: CreateOutcome) -> Self {
        Self {
            status: "success",
            code: StatusCode::CREATED.as_u16(),
            message: "Loan data created successfully",
            inserted_id: outcome.inserted_id.map(to_json),
            application_id: outcome.application_id,
            installment_amount: outcome.quote.map(|q| q.installment_amount),
            total_payment: outcome.quote.map(|q| q.total_payment),
        }
    }
}

#[derive(Serialize)]
struct GetResponse {
    status: &'static str,
    code: u16,
    count: usize,
    data: Vec<Value>,
}

#[derive(Serialize)]
struct UpdateResponse {
    status: &'static str,
    code: u16,
    matched_count: u64,
    modified_count: u64,
    upserted_id: Option<Value>,
}

#[derive(Serialize)]
struct DeleteResponse {
    status: &'static str,
    code: u16,
    deleted_count: u64,
}

/// POST /api/v1/loan/create
pub async fn handle_create(state: Arc<AppState>, body: Bytes) -> Response<FullBody> {
    if let Err(e) = state.gateway.ensure_available() {
        return error_response(&e);
    }
    let request: CreateRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.gateway.create(request).await {
        Ok(outcome) => json_response(StatusCode::CREATED, &CreateResponse::from(outcome)),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/loan/get
pub async fn handle_get(state: Arc<AppState>, body: Bytes) -> Response<FullBody> {
    if let Err(e) = state.gateway.ensure_available() {
        return error_response(&e);
    }
    let request: GetRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.gateway.get(request).await {
        Ok(documents) => {
            let data: Vec<Value> = documents
                .into_iter()
                .map(|d: Document| to_json(Bson::Document(d)))
                .collect();
            json_response(
                StatusCode::OK,
                &GetResponse {
                    status: "success",
                    code: StatusCode::OK.as_u16(),
                    count: data.len(),
                    data,
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/loan/update
pub async fn handle_update(state: Arc<AppState>, body: Bytes) -> Response<FullBody> {
    if let Err(e) = state.gateway.ensure_available() {
        return error_response(&e);
    }
    let request: UpdateRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.gateway.update(request).await {
        Ok(outcome) => json_response(
            StatusCode::OK,
            &UpdateResponse {
                status: "success",
                code: StatusCode::OK.as_u16(),
                matched_count: outcome.matched_count,
                modified_count: outcome.modified_count,
                upserted_id: outcome.upserted_id.map(to_json),
            },
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/loan/delete
pub async fn handle_delete(state: Arc<AppState>, body: Bytes) -> Response<FullBody> {
    if let Err(e) = state.gateway.ensure_available() {
        return error_response(&e);
    }
    let request: DeleteRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.gateway.delete(request).await {
        Ok(deleted_count) => json_response(
            StatusCode::OK,
            &DeleteResponse {
                status: "success",
                code: StatusCode::OK.as_u16(),
                deleted_count,
            },
        ),
        Err(e) => error_response(&e),
    }
}
