//! Shared fixtures for the integration tests

#![allow(dead_code)]

use bson::{doc, Bson, Document};
use coop_gateway::db::{
    DocumentStore, FindSpec, MemoryStore, SharedStore, TransferPlan, UpdateOutcome,
};
use coop_gateway::types::{GatewayError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_DB: &str = "coop_test";

/// MemoryStore wrapper counting every store call
pub struct CountingStore {
    pub inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(TEST_DB),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DocumentStore for CountingStore {
    fn backend(&self) -> &'static str {
        "counting"
    }

    async fn find_one(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.touch();
        self.inner.find_one(db, coll, filter).await
    }

    async fn find(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        self.touch();
        self.inner.find(db, coll, filter, spec).await
    }

    async fn insert_one(&self, db: Option<&str>, coll: &str, document: Document) -> Result<Bson> {
        self.touch();
        self.inner.insert_one(db, coll, document).await
    }

    async fn update_one(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        self.touch();
        self.inner.update_one(db, coll, filter, update, upsert).await
    }

    async fn delete_many(&self, db: Option<&str>, coll: &str, filter: Document) -> Result<u64> {
        self.touch();
        self.inner.delete_many(db, coll, filter).await
    }

    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<()> {
        self.touch();
        self.inner.apply_transfer(plan).await
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.inner.ensure_indexes().await
    }
}

/// MemoryStore whose transfer unit of work always fails before applying
pub struct FailingTransferStore {
    pub inner: MemoryStore,
}

#[async_trait::async_trait]
impl DocumentStore for FailingTransferStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn find_one(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.inner.find_one(db, coll, filter).await
    }

    async fn find(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        self.inner.find(db, coll, filter, spec).await
    }

    async fn insert_one(&self, db: Option<&str>, coll: &str, document: Document) -> Result<Bson> {
        self.inner.insert_one(db, coll, document).await
    }

    async fn update_one(
        &self,
        db: Option<&str>,
        coll: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        self.inner.update_one(db, coll, filter, update, upsert).await
    }

    async fn delete_many(&self, db: Option<&str>, coll: &str, filter: Document) -> Result<u64> {
        self.inner.delete_many(db, coll, filter).await
    }

    async fn apply_transfer(&self, _plan: &TransferPlan) -> Result<()> {
        Err(GatewayError::database("Database operation failed", "write conflict"))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }
}

/// Insert a deposit account with the given balance
pub async fn seed_account(
    store: &dyn DocumentStore,
    id: &str,
    number: &str,
    name: &str,
    member: &str,
    balance: f64,
) {
    store
        .insert_one(
            None,
            "deposit_accounts",
            doc! {
                "accountid": id,
                "accountnumber": number,
                "accountname": name,
                "memberid": member,
                "balance": balance,
            },
        )
        .await
        .unwrap();
}

/// Insert a member with the given KYC status
pub async fn seed_member(store: &dyn DocumentStore, member: &str, kyc_status: &str) {
    store
        .insert_one(
            None,
            "members",
            doc! {
                "memberid": member,
                "applicationid": format!("APP-{member}"),
                "kyc_status": kyc_status,
            },
        )
        .await
        .unwrap();
}

pub async fn balance_of(store: &dyn DocumentStore, account: &str) -> f64 {
    store
        .find_one(None, "deposit_accounts", doc! { "accountid": account })
        .await
        .unwrap()
        .unwrap()
        .get_f64("balance")
        .unwrap()
}

pub fn shared(store: Arc<impl DocumentStore + 'static>) -> SharedStore {
    store
}
