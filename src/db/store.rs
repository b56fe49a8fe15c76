//! Document store seam
//!
//! The gateway and the ledger only ever talk to persistence through
//! [`DocumentStore`]. Filters and update documents are passed through to the
//! store verbatim.

use bson::{Bson, Document};
use std::sync::Arc;

use crate::db::schemas::DepositTransaction;
use crate::types::Result;

/// Sort/limit/skip options for `find`
#[derive(Debug, Clone, Default)]
pub struct FindSpec {
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

/// Outcome of a single-document update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

/// Everything the transfer unit of work applies, all or nothing
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// `None` selects the default database
    pub database: Option<String>,
    pub source_account_id: String,
    pub dest_account_id: String,
    pub amount: f64,
    /// `transfer_out` leg on the source account
    pub outgoing: DepositTransaction,
    /// `transfer_in` leg on the destination account
    pub incoming: DepositTransaction,
}

/// Persistence operations used by the gateway and the ledger
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    async fn find_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>>;

    async fn find(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>>;

    /// Insert one document, returning its `_id`
    async fn insert_one(
        &self,
        database: Option<&str>,
        collection: &str,
        document: Document,
    ) -> Result<Bson>;

    async fn update_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Delete every matching document, returning the deleted count
    async fn delete_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<u64>;

    /// Debit, credit and insert both legs as one atomic unit.
    ///
    /// On error none of the four effects may be visible.
    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<()>;

    /// Create the unique and lookup indexes (idempotent)
    async fn ensure_indexes(&self) -> Result<()>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn DocumentStore>;
