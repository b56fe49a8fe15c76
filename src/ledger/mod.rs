//! Ledger transfer engine
//!
//! Moves money between two deposit accounts. The debit, the credit and the
//! two transaction legs are applied as one unit of work by the store; the
//! funds check runs before it against the balance read at the start, so two
//! concurrent transfers draining the same account can still overdraw it.

pub mod ids;
pub mod slip;

pub use ids::TransactionIdGenerator;
pub use slip::{mask_account_number, AccountInfo, SlipInfo, SlipSettings};

use bson::doc;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::schemas::{
    DepositAccount, DepositTransaction, TransactionType, DEPOSIT_ACCOUNT_COLLECTION,
};
use crate::db::{DocumentStore, SharedStore, TransferPlan};
use crate::types::{GatewayError, Result};

/// Body of a transfer request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferRequest {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub source_account_id: String,
    #[serde(default)]
    pub dest_account_id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

/// Summary of a committed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    /// Identifier of the outgoing leg
    pub transaction_id: String,
    pub slip_info: SlipInfo,
}

pub struct Ledger {
    store: Option<SharedStore>,
    ids: TransactionIdGenerator,
    slip: SlipSettings,
    timeout: Duration,
}

impl Ledger {
    pub fn new(store: Option<SharedStore>, slip: SlipSettings, timeout: Duration) -> Self {
        Self {
            store,
            ids: TransactionIdGenerator::new(),
            slip,
            timeout,
        }
    }

    /// Transfer `amount` from the source account to the destination account
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let result = self.transfer_inner(&request).await;
        match &result {
            Ok(receipt) => info!(
                "Transfer {} committed: {} -> {} amount {}",
                receipt.transaction_id,
                request.source_account_id,
                request.dest_account_id,
                request.amount
            ),
            Err(e) if e.status_code().is_server_error() => error!(
                "Transfer {} -> {} failed: {} {}",
                request.source_account_id,
                request.dest_account_id,
                e,
                e.detail().unwrap_or_default()
            ),
            Err(e) => warn!(
                "Transfer {} -> {} rejected: {}",
                request.source_account_id, request.dest_account_id, e
            ),
        }
        result
    }

    async fn transfer_inner(&self, request: &TransferRequest) -> Result<TransferReceipt> {
        validate(request)?;
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| GatewayError::Unavailable("Database not connected".to_string()))?;

        tokio::time::timeout(self.timeout, self.run(store, request))
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!(
                    "transfer did not complete within {:?}",
                    self.timeout
                ))
            })?
    }

    async fn run(
        &self,
        store: &dyn DocumentStore,
        request: &TransferRequest,
    ) -> Result<TransferReceipt> {
        let database = request.database.as_deref().filter(|d| !d.is_empty());
        let amount = request.amount;

        let source = load_account(store, database, &request.source_account_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("Source account not found".to_string()))?;
        if source.balance() < amount {
            return Err(GatewayError::InsufficientFunds);
        }
        let dest = load_account(store, database, &request.dest_account_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("Destination account not found".to_string()))?;

        let now = Utc::now();
        let datetime = bson::DateTime::from_chrono(now);
        let (outgoing_id, incoming_id) = self.ids.leg_ids();

        let plan = TransferPlan {
            database: database.map(str::to_string),
            source_account_id: request.source_account_id.clone(),
            dest_account_id: request.dest_account_id.clone(),
            amount,
            outgoing: DepositTransaction {
                transactionid: outgoing_id.clone(),
                accountid: request.source_account_id.clone(),
                tx_type: TransactionType::TransferOut,
                amount,
                balanceafter: source.balance() - amount,
                datetime,
                description: format!("{} (transfer to {})", request.description, dest.name()),
                referenceno: request.dest_account_id.clone(),
                status: "completed".to_string(),
            },
            incoming: DepositTransaction {
                transactionid: incoming_id,
                accountid: request.dest_account_id.clone(),
                tx_type: TransactionType::TransferIn,
                amount,
                balanceafter: dest.balance() + amount,
                datetime,
                description: format!("{} (received from {})", request.description, source.name()),
                referenceno: request.source_account_id.clone(),
                status: "completed".to_string(),
            },
        };

        store.apply_transfer(&plan).await.map_err(|e| match e {
            GatewayError::TransferFailed(_) => e,
            other => GatewayError::TransferFailed(other.to_string()),
        })?;

        let source_number = source.accountnumber.as_deref().unwrap_or_default();
        let dest_number = dest.accountnumber.as_deref().unwrap_or_default();
        let slip_info = SlipInfo {
            transaction_ref: outgoing_id.clone(),
            transaction_date: now,
            sender: AccountInfo {
                name: source.name().to_string(),
                account_no_masked: mask_account_number(source_number),
                bank_name: self.slip.bank_name.clone(),
                bank_code: None,
            },
            receiver: AccountInfo {
                name: dest.name().to_string(),
                account_no_masked: mask_account_number(dest_number),
                bank_name: self.slip.bank_name.clone(),
                bank_code: Some(self.slip.bank_code.clone()),
            },
            amount,
            qr_payload: self.slip.qr_payload(&outgoing_id),
        };

        Ok(TransferReceipt {
            transaction_id: outgoing_id,
            slip_info,
        })
    }
}

fn validate(request: &TransferRequest) -> Result<()> {
    if request.source_account_id.is_empty()
        || request.dest_account_id.is_empty()
        || !request.amount.is_finite()
        || request.amount <= 0.0
    {
        return Err(GatewayError::Validation(
            "source_account_id, dest_account_id and valid amount are required".to_string(),
        ));
    }
    if request.source_account_id == request.dest_account_id {
        return Err(GatewayError::Validation(
            "Source and destination accounts must differ".to_string(),
        ));
    }
    Ok(())
}

async fn load_account(
    store: &dyn DocumentStore,
    database: Option<&str>,
    account_id: &str,
) -> Result<Option<DepositAccount>> {
    let found = store
        .find_one(database, DEPOSIT_ACCOUNT_COLLECTION, doc! { "accountid": account_id })
        .await?;
    Ok(found.map(bson::from_document::<DepositAccount>).transpose()?)
}
