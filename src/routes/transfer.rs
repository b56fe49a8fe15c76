//! Ledger transfer handler (/api/v1/deposit/transfer)

use bytes::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::ledger::{SlipInfo, TransferRequest};
use crate::routes::{error_response, json_response, parse_body, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
struct TransferResponse {
    status: &'static str,
    message: &'static str,
    transaction_id: String,
    slip_info: SlipInfo,
}

/// POST /api/v1/deposit/transfer
pub async fn handle_transfer(state: Arc<AppState>, body: Bytes) -> Response<FullBody> {
    let request: TransferRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.ledger.transfer(request).await {
        Ok(receipt) => json_response(
            StatusCode::OK,
            &TransferResponse {
                status: "success",
                message: "Transfer completed successfully",
                transaction_id: receipt.transaction_id,
                slip_info: receipt.slip_info,
            },
        ),
        Err(e) => error_response(&e),
    }
}
