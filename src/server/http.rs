//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is a single
//! `match` on method and path; every response passes through [`dispatch`],
//! which applies the CORS headers.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::{Args, STORE_DOCUMENT_LIMIT};
use crate::db::{MongoClient, SharedStore};
use crate::gateway::{CollectionPolicy, Gateway};
use crate::ledger::{Ledger, SlipSettings};
use crate::routes::{self, error_response, FullBody};
use crate::types::{GatewayError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Store handle shared by every request; `None` until connected
    pub store: Option<SharedStore>,
    pub gateway: Gateway,
    pub ledger: Ledger,
    /// Raw client, kept so shutdown can release the connection pool
    pub mongo: Option<MongoClient>,
}

impl AppState {
    pub fn new(args: Args, store: Option<SharedStore>, mongo: Option<MongoClient>) -> Self {
        let gateway = Gateway::new(
            store.clone(),
            CollectionPolicy::new(args.max_document_bytes),
            args.crud_timeout(),
        );
        let ledger = Ledger::new(
            store.clone(),
            SlipSettings {
                bank_name: args.bank_name.clone(),
                bank_code: args.bank_code.clone(),
                qr_verify_base_url: args.qr_verify_base_url.clone(),
            },
            args.transfer_timeout(),
        );

        Self {
            args,
            store,
            gateway,
            ledger,
            mongo,
        }
    }
}

/// Start the HTTP server; returns once a shutdown signal arrives
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Coop gateway listening on {} (store: {})",
        state.args.listen,
        state.store.as_ref().map_or("none", |s| s.backend())
    );
    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move {
                                Ok::<_, Infallible>(handle_request(state, addr, req).await)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Read the body and route an incoming HTTP request
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Response<FullBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    info!("[{}] {} {}", addr, method, path);

    let body = if method == Method::POST {
        match Limited::new(req.into_body(), STORE_DOCUMENT_LIMIT).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                    GatewayError::PayloadTooLarge("Request body too large".to_string())
                } else {
                    debug!("Failed to read body from {}: {}", addr, e);
                    GatewayError::Validation("Invalid request body".to_string())
                };
                return with_cors(&state, origin.as_deref(), error_response(&err));
            }
        }
    } else {
        Bytes::new()
    };

    dispatch(state, method, &path, origin.as_deref(), body).await
}

/// Route a request whose body has already been read
pub async fn dispatch(
    state: Arc<AppState>,
    method: Method,
    path: &str,
    origin: Option<&str>,
    body: Bytes,
) -> Response<FullBody> {
    let response = match (method, path) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }
        (Method::GET, "/version") => routes::version_info(),

        (Method::POST, "/api/v1/loan/create") => {
            routes::handle_create(Arc::clone(&state), body).await
        }
        (Method::POST, "/api/v1/loan/get") => routes::handle_get(Arc::clone(&state), body).await,
        (Method::POST, "/api/v1/loan/update") => {
            routes::handle_update(Arc::clone(&state), body).await
        }
        (Method::POST, "/api/v1/loan/delete") => {
            routes::handle_delete(Arc::clone(&state), body).await
        }
        (Method::POST, "/api/v1/deposit/transfer") => {
            routes::handle_transfer(Arc::clone(&state), body).await
        }

        _ => not_found_response(path),
    };

    with_cors(&state, origin, response)
}

fn with_cors(
    state: &AppState,
    origin: Option<&str>,
    mut response: Response<FullBody>,
) -> Response<FullBody> {
    let allowed = state.args.allowed_origin(origin);
    let value = HeaderValue::from_str(&allowed).unwrap_or_else(|_| HeaderValue::from_static("*"));
    response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    response
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<FullBody> {
    let body = serde_json::json!({
        "status": "error",
        "code": 404,
        "message": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
