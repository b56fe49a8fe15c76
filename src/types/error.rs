//! Error types for the gateway
//!
//! Every variant maps onto one HTTP status and renders the common error
//! envelope `{status: "error", code, message, error?}`.

use hyper::StatusCode;
use serde_json::json;

/// Main error type for gateway and ledger operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or malformed required field
    #[error("{0}")]
    Validation(String),

    /// Collection not whitelisted, or KYC not verified
    #[error("{0}")]
    Authorization(String),

    /// Duplicate member / application
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Store handle not initialized
    #[error("{0}")]
    Unavailable(String),

    #[error("Insufficient balance")]
    InsufficientFunds,

    /// Failure inside the transfer unit of work; nothing was committed
    #[error("Transfer failed")]
    TransferFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Store failure outside a transfer
    #[error("{context}")]
    Database { context: String, detail: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Store failure with a client-facing context message
    pub fn database(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Database {
            context: context.into(),
            detail: err.to_string(),
        }
    }

    /// Replace the client-facing message of a store failure; other errors pass through
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::Database { detail, .. } => Self::Database {
                context: context.into(),
                detail,
            },
            other => other,
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InsufficientFunds => StatusCode::BAD_REQUEST,
            Self::TransferFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Underlying detail surfaced in the envelope's `error` field
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Database { detail, .. } => Some(detail),
            Self::TransferFailed(detail) => Some(detail),
            _ => None,
        }
    }

    /// Render the JSON error envelope
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut body = json!({
            "status": "error",
            "code": self.status_code().as_u16(),
            "message": self.to_string(),
        });
        if let Some(detail) = self.detail() {
            body["error"] = json!(detail);
        }
        body
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        (self.status_code(), self.to_envelope().to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid JSON: {}", err))
    }
}

impl From<mongodb::error::Error> for GatewayError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::database("Database operation failed", err)
    }
}

impl From<bson::ser::Error> for GatewayError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for GatewayError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for GatewayError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout("deadline exceeded".to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(GatewayError::Validation("x".into()).status_code(), 400);
        assert_eq!(GatewayError::Authorization("x".into()).status_code(), 403);
        assert_eq!(GatewayError::NotFound("x".into()).status_code(), 404);
        assert_eq!(GatewayError::Conflict("x".into()).status_code(), 409);
        assert_eq!(GatewayError::PayloadTooLarge("x".into()).status_code(), 413);
        assert_eq!(GatewayError::Unavailable("x".into()).status_code(), 503);
        assert_eq!(GatewayError::InsufficientFunds.status_code(), 400);
    }

    #[test]
    fn test_envelope_includes_detail_only_for_store_failures() {
        let err = GatewayError::Conflict("Member already exists".into());
        let body = err.to_envelope();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], 409);
        assert_eq!(body["message"], "Member already exists");
        assert!(body.get("error").is_none());

        let err = GatewayError::database("Failed to create document", "connection reset");
        let body = err.to_envelope();
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "Failed to create document");
        assert_eq!(body["error"], "connection reset");
    }

    #[test]
    fn test_with_context_only_rewrites_store_failures() {
        let err = GatewayError::database("Database operation failed", "boom")
            .with_context("Failed to update document");
        assert_eq!(err.to_string(), "Failed to update document");
        assert_eq!(err.detail(), Some("boom"));

        let err = GatewayError::Conflict("dup".into()).with_context("ignored");
        assert_eq!(err.to_string(), "dup");
    }
}
