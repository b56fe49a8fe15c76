//! HTTP routes for the gateway

pub mod gateway;
pub mod health;
pub mod transfer;

pub use gateway::{handle_create, handle_delete, handle_get, handle_update};
pub use health::{health_check, readiness_check, version_info};
pub use transfer::handle_transfer;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::types::{GatewayError, Result};

pub type FullBody = Full<Bytes>;

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Render a gateway error as the common error envelope
pub(crate) fn error_response(err: &GatewayError) -> Response<FullBody> {
    json_response(err.status_code(), &err.to_envelope())
}

/// Decode a JSON request body
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejected request body: {}", e);
        GatewayError::Validation("Invalid request body".to_string())
    })
}
