//! Deposit transaction document schema
//!
//! Transactions are append-only. The ledger writes them through this typed
//! record; the gateway reads only `type`/`status`/`accountid` off incoming
//! payloads for the KYC gate.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Serialize, Serializer};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{plain_index, unique_index};

/// Collection name for deposit transactions
pub const DEPOSIT_TRANSACTION_COLLECTION: &str = "deposit_transactions";

/// Transaction kind stored in the `type` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Payment,
    Pay,
    Other(String),
}

impl TransactionType {
    pub fn parse(value: &str) -> Self {
        match value {
            "deposit" => Self::Deposit,
            "withdrawal" => Self::Withdrawal,
            "transfer_in" => Self::TransferIn,
            "transfer_out" => Self::TransferOut,
            "payment" => Self::Payment,
            "pay" => Self::Pay,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
            Self::Payment => "payment",
            Self::Pay => "pay",
            Self::Other(other) => other,
        }
    }

    /// Whether creating a transaction of this kind needs a KYC-verified owner.
    ///
    /// Deposits only need it while pending (member-initiated); officer
    /// deposits created as completed bypass the gate.
    pub fn requires_kyc(&self, status: Option<&str>) -> bool {
        match self {
            Self::Withdrawal | Self::TransferOut | Self::Payment | Self::Pay => true,
            Self::Deposit => status == Some("pending"),
            Self::TransferIn | Self::Other(_) => false,
        }
    }
}

impl Serialize for TransactionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One leg of ledger movement
#[derive(Serialize, Clone, Debug)]
pub struct DepositTransaction {
    pub transactionid: String,
    pub accountid: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: f64,
    pub balanceafter: f64,
    pub datetime: DateTime,
    pub description: String,
    /// Account id of the opposite leg for transfers
    pub referenceno: String,
    pub status: String,
}

impl IntoIndexes for DepositTransaction {
    const COLLECTION: &'static str = DEPOSIT_TRANSACTION_COLLECTION;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            unique_index(doc! { "transactionid": 1 }, "transactionid_unique"),
            plain_index(doc! { "accountid": 1 }, "accountid_index"),
            plain_index(doc! { "status": 1 }, "status_index"),
            plain_index(doc! { "datetime": -1 }, "datetime_desc"),
        ]
    }
}
