//! Health check endpoints
//!
//! - /health, /healthz - liveness, 200 whenever the process is serving
//! - /ready, /readyz - readiness, 200 only while a store handle exists
//! - /version - build information

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Store backend in use: `mongodb`, `memory` or `none`
    pub store: &'static str,
    /// `development` or `production`
    pub mode: &'static str,
    pub timestamp: String,
}

fn build_health_response(state: &AppState, status: &'static str) -> HealthResponse {
    HealthResponse {
        status,
        service: "coop-gateway",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.as_ref().map_or("none", |s| s.backend()),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    json_response(StatusCode::OK, &build_health_response(&state, "ok"))
}

/// Handle readiness probe (/ready, /readyz)
pub fn readiness_check(state: Arc<AppState>) -> Response<FullBody> {
    if state.store.is_some() {
        json_response(StatusCode::OK, &build_health_response(&state, "ready"))
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &build_health_response(&state, "unavailable"),
        )
    }
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "coop-gateway",
    };
    json_response(StatusCode::OK, &response)
}
