//! Database schemas for the gateway
//!
//! Gateway payloads stay schema-flexible `bson::Document`s. The typed records
//! here are only what the business rules and the ledger read or write, plus
//! the index definitions for each domain collection.

mod deposit_account;
mod deposit_transaction;
mod loan_application;
mod member;

pub use deposit_account::{DepositAccount, DEPOSIT_ACCOUNT_COLLECTION};
pub use deposit_transaction::{DepositTransaction, TransactionType, DEPOSIT_TRANSACTION_COLLECTION};
pub use loan_application::{
    LoanApplication, LoanProduct, LoanQuote, LoanTerms, LOAN_APPLICATION_COLLECTION,
    LOAN_PRODUCT_COLLECTION,
};
pub use member::{KycStatus, Member, MEMBER_COLLECTION};

use bson::{Bson, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Deserializer};

use crate::db::mongo::IntoIndexes;

/// Index definitions for one collection
pub type CollectionIndexes = (&'static str, Vec<(Document, Option<IndexOptions>)>);

/// Every index the gateway relies on, grouped by collection
pub fn index_plan() -> Vec<CollectionIndexes> {
    vec![
        (LoanApplication::COLLECTION, LoanApplication::into_indices()),
        (LoanProduct::COLLECTION, LoanProduct::into_indices()),
        (Member::COLLECTION, Member::into_indices()),
        (DepositAccount::COLLECTION, DepositAccount::into_indices()),
        (DepositTransaction::COLLECTION, DepositTransaction::into_indices()),
    ]
}

/// Unique key fields per collection, derived from [`index_plan`]
pub fn unique_keys() -> Vec<(&'static str, Vec<Vec<String>>)> {
    index_plan()
        .into_iter()
        .map(|(collection, indexes)| {
            let keys = indexes
                .into_iter()
                .filter(|(_, opts)| opts.as_ref().and_then(|o| o.unique).unwrap_or(false))
                .map(|(keys, _)| keys.keys().cloned().collect())
                .collect();
            (collection, keys)
        })
        .collect()
}

pub(crate) fn unique_index(keys: Document, name: &str) -> (Document, Option<IndexOptions>) {
    (
        keys,
        Some(
            IndexOptions::builder()
                .unique(true)
                .name(name.to_string())
                .build(),
        ),
    )
}

pub(crate) fn plain_index(keys: Document, name: &str) -> (Document, Option<IndexOptions>) {
    (
        keys,
        Some(IndexOptions::builder().name(name.to_string()).build()),
    )
}

/// Numeric view of a BSON value; `None` for non-numeric or non-finite values
pub fn as_f64(value: &Bson) -> Option<f64> {
    let n = match value {
        Bson::Double(v) => *v,
        Bson::Int32(v) => f64::from(*v),
        Bson::Int64(v) => *v as f64,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// String view of a BSON scalar; numbers are rendered without a trailing `.0`
pub fn as_string(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(v) => Some(v.to_string()),
        Bson::Int64(v) => Some(v.to_string()),
        Bson::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(format!("{:.0}", v)),
        Bson::Double(v) => Some(v.to_string()),
        _ => None,
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Bson>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_f64))
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Bson>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_string))
}
