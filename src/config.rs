//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Hard per-document limit of the underlying store (16 MiB)
pub const STORE_DOCUMENT_LIMIT: usize = 16 * 1024 * 1024;

/// Default Collection Policy ceiling (15 MiB), leaving headroom below the store limit
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 15 * 1024 * 1024;

/// Coop gateway - document CRUD and ledger transfers for the loan/savings app
#[derive(Parser, Debug, Clone)]
#[command(name = "coop-gateway")]
#[command(about = "Data gateway for the cooperative loan and savings application")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI (required unless DEV_MODE is set)
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Default MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "coop_digital")]
    pub mongodb_db: String,

    /// Enable development mode (in-memory store when MongoDB is unavailable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Deadline for each gateway store operation in milliseconds
    #[arg(long, env = "CRUD_TIMEOUT_MS", default_value = "10000")]
    pub crud_timeout_ms: u64,

    /// Deadline for transfers and index creation in milliseconds
    #[arg(long, env = "TRANSFER_TIMEOUT_MS", default_value = "30000")]
    pub transfer_timeout_ms: u64,

    /// Maximum serialized size of a create/update payload
    #[arg(long, env = "MAX_DOCUMENT_BYTES", default_value_t = DEFAULT_MAX_DOCUMENT_BYTES)]
    pub max_document_bytes: usize,

    /// Comma-separated list of allowed CORS origins
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Base URL embedded in transfer slip QR payloads
    #[arg(long, env = "QR_VERIFY_BASE_URL", default_value = "https://coopapp.com")]
    pub qr_verify_base_url: String,

    /// Bank name printed on transfer slips
    #[arg(long, env = "BANK_NAME", default_value = "Coop Saving")]
    pub bank_name: String,

    /// Bank code printed on the receiver side of transfer slips
    #[arg(long, env = "BANK_CODE", default_value = "COOP")]
    pub bank_code: String,

    /// Skip index creation at startup
    #[arg(long, env = "SKIP_INDEXES", default_value = "false")]
    pub skip_indexes: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            mongodb_uri: None,
            mongodb_db: "coop_digital".to_string(),
            dev_mode: true,
            log_level: "info".to_string(),
            crud_timeout_ms: 10_000,
            transfer_timeout_ms: 30_000,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            cors_origins: "*".to_string(),
            qr_verify_base_url: "https://coopapp.com".to_string(),
            bank_name: "Coop Saving".to_string(),
            bank_code: "COOP".to_string(),
            skip_indexes: false,
        }
    }
}

impl Args {
    pub fn crud_timeout(&self) -> Duration {
        Duration::from_millis(self.crud_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// Parsed CORS origin list; `*` when unset
    pub fn cors_origin_list(&self) -> Vec<String> {
        let origins: Vec<String> = self
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if origins.is_empty() {
            vec!["*".to_string()]
        } else {
            origins
        }
    }

    /// Pick the `Access-Control-Allow-Origin` value for a request origin
    pub fn allowed_origin(&self, request_origin: Option<&str>) -> String {
        let origins = self.cors_origin_list();
        if origins.iter().any(|o| o == "*") {
            return "*".to_string();
        }
        match request_origin {
            Some(origin) if origins.iter().any(|o| o == origin) => origin.to_string(),
            _ => origins[0].clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.mongodb_uri.as_deref().map_or(true, str::is_empty) {
            return Err("MONGODB_URI is required in production mode".to_string());
        }

        if self.crud_timeout_ms == 0 || self.transfer_timeout_ms == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }

        if self.max_document_bytes == 0 || self.max_document_bytes > STORE_DOCUMENT_LIMIT {
            return Err(format!(
                "MAX_DOCUMENT_BYTES must be between 1 and {}",
                STORE_DOCUMENT_LIMIT
            ));
        }

        if self.bank_name.trim().is_empty() {
            return Err("BANK_NAME must not be empty".to_string());
        }

        Ok(())
    }
}
