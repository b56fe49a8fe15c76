//! Deposit account document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::Deserialize;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{lenient_f64, lenient_string, plain_index, unique_index};

/// Collection name for deposit accounts
pub const DEPOSIT_ACCOUNT_COLLECTION: &str = "deposit_accounts";

/// Deposit account as read by the KYC gate and the ledger
///
/// `balance` is only ever changed through `$inc` inside a transfer.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct DepositAccount {
    #[serde(deserialize_with = "lenient_string")]
    pub accountid: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub accountnumber: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub accountname: Option<String>,

    /// Owning member
    #[serde(deserialize_with = "lenient_string")]
    pub memberid: Option<String>,

    #[serde(deserialize_with = "lenient_f64")]
    pub balance: Option<f64>,
}

impl DepositAccount {
    /// Balance as stored; absent or non-numeric balances read as zero
    pub fn balance(&self) -> f64 {
        self.balance.unwrap_or(0.0)
    }

    pub fn name(&self) -> &str {
        self.accountname.as_deref().unwrap_or_default()
    }
}

impl IntoIndexes for DepositAccount {
    const COLLECTION: &'static str = DEPOSIT_ACCOUNT_COLLECTION;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            unique_index(doc! { "accountid": 1 }, "accountid_unique"),
            unique_index(doc! { "accountnumber": 1 }, "accountnumber_unique"),
            plain_index(doc! { "memberid": 1 }, "memberid_index"),
        ]
    }
}
