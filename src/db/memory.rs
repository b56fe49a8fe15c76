//! In-memory document store
//!
//! Used in development mode when MongoDB is unavailable, and by the test
//! suite. All collections sit behind one lock, so a transfer applied under
//! the write lock is observed all at once or not at all. The unique keys of
//! the index plan are enforced on every write, with a missing field counting
//! as `null` like a non-sparse unique index.

use bson::{oid::ObjectId, Bson, Document};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::db::query::{apply_update, lookup, matches, sort_documents, upsert_seed, values_equal};
use crate::db::schemas::{unique_keys, DEPOSIT_ACCOUNT_COLLECTION, DEPOSIT_TRANSACTION_COLLECTION};
use crate::db::store::{DocumentStore, FindSpec, TransferPlan, UpdateOutcome};
use crate::types::{GatewayError, Result};

/// (database, collection)
type Namespace = (String, String);

/// [`DocumentStore`] kept entirely in process memory
pub struct MemoryStore {
    default_db: String,
    collections: RwLock<HashMap<Namespace, Vec<Document>>>,
    unique: HashMap<&'static str, Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new(default_db: impl Into<String>) -> Self {
        warn!("Document store running in memory-only mode (no MongoDB)");
        Self {
            default_db: default_db.into(),
            collections: RwLock::new(HashMap::new()),
            unique: unique_keys().into_iter().collect(),
        }
    }

    fn namespace(&self, database: Option<&str>, collection: &str) -> Namespace {
        let db = match database {
            Some(name) if !name.is_empty() => name,
            _ => self.default_db.as_str(),
        };
        (db.to_string(), collection.to_string())
    }

    /// Number of documents in a collection (test and diagnostics helper)
    pub async fn count(&self, database: Option<&str>, collection: &str) -> usize {
        let ns = self.namespace(database, collection);
        self.collections.read().await.get(&ns).map_or(0, Vec::len)
    }

    /// Reject `candidate` if it collides with another document on a unique key
    fn check_unique(
        &self,
        collection: &str,
        documents: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<()> {
        let Some(key_sets) = self.unique.get(collection) else {
            return Ok(());
        };
        for keys in key_sets {
            let key_of = |d: &Document| -> Vec<Bson> {
                keys.iter()
                    .map(|k| lookup(d, k).cloned().unwrap_or(Bson::Null))
                    .collect()
            };
            let wanted = key_of(candidate);
            let clash = documents
                .iter()
                .enumerate()
                .any(|(i, d)| {
                    Some(i) != skip
                        && key_of(d)
                            .iter()
                            .zip(&wanted)
                            .all(|(a, b)| values_equal(a, b))
                });
            if clash {
                return Err(GatewayError::Conflict(format!(
                    "Document with this unique key already exists ({})",
                    keys.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn position(documents: &[Document], filter: &Document) -> Result<Option<usize>> {
        for (i, document) in documents.iter().enumerate() {
            if matches(document, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn account_position(documents: &[Document], account_id: &str) -> Option<usize> {
        documents
            .iter()
            .position(|d| lookup(d, "accountid") == Some(&Bson::String(account_id.to_string())))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        let ns = self.namespace(database, collection);
        let guard = self.collections.read().await;
        let Some(documents) = guard.get(&ns) else {
            return Ok(None);
        };
        Ok(Self::position(documents, &filter)?.map(|i| documents[i].clone()))
    }

    async fn find(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let ns = self.namespace(database, collection);
        let guard = self.collections.read().await;
        let mut found = Vec::new();
        for document in guard.get(&ns).into_iter().flatten() {
            if matches(document, &filter)? {
                found.push(document.clone());
            }
        }
        drop(guard);

        if let Some(sort) = &spec.sort {
            sort_documents(&mut found, sort);
        }
        let skip = spec.skip.unwrap_or(0) as usize;
        let limit = spec
            .limit
            .filter(|l| *l != 0)
            .map(|l| l.unsigned_abs() as usize)
            .unwrap_or(usize::MAX);

        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn insert_one(
        &self,
        database: Option<&str>,
        collection: &str,
        mut document: Document,
    ) -> Result<Bson> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let ns = self.namespace(database, collection);
        let mut guard = self.collections.write().await;
        let documents = guard.entry(ns).or_default();
        if documents.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(GatewayError::Conflict("Duplicate _id".to_string()));
        }
        self.check_unique(collection, documents, &document, None)?;
        documents.push(document);
        debug!("Inserted into {}: {}", collection, id);
        Ok(id)
    }

    async fn update_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let ns = self.namespace(database, collection);
        let mut guard = self.collections.write().await;
        let documents = guard.entry(ns).or_default();

        if let Some(i) = Self::position(documents, &filter)? {
            let mut updated = documents[i].clone();
            let modified = apply_update(&mut updated, &update, false)?;
            if modified {
                self.check_unique(collection, documents, &updated, Some(i))?;
                documents[i] = updated;
            }
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let mut created = upsert_seed(&filter)?;
        apply_update(&mut created, &update, true)?;
        if !created.contains_key("_id") {
            created.insert("_id", ObjectId::new());
        }
        self.check_unique(collection, documents, &created, None)?;
        let id = created.get("_id").cloned();
        documents.push(created);

        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id: id,
        })
    }

    async fn delete_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<u64> {
        let ns = self.namespace(database, collection);
        let mut guard = self.collections.write().await;
        let Some(documents) = guard.get_mut(&ns) else {
            return Ok(0);
        };

        let mut keep = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            keep.push(!matches(document, &filter)?);
        }
        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));
        Ok((before - documents.len()) as u64)
    }

    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<()> {
        let database = plan.database.as_deref();
        let accounts_ns = self.namespace(database, DEPOSIT_ACCOUNT_COLLECTION);
        let transactions_ns = self.namespace(database, DEPOSIT_TRANSACTION_COLLECTION);

        let mut guard = self.collections.write().await;

        // Stage every effect before touching shared state
        let accounts = guard.get(&accounts_ns).cloned().unwrap_or_default();
        let source = Self::account_position(&accounts, &plan.source_account_id)
            .ok_or_else(|| GatewayError::TransferFailed("source account not found".into()))?;
        let dest = Self::account_position(&accounts, &plan.dest_account_id)
            .ok_or_else(|| GatewayError::TransferFailed("destination account not found".into()))?;

        let mut staged_accounts = accounts;
        let debit = bson::doc! { "$inc": { "balance": -plan.amount } };
        let credit = bson::doc! { "$inc": { "balance": plan.amount } };
        apply_update(&mut staged_accounts[source], &debit, false)
            .map_err(|e| GatewayError::TransferFailed(e.to_string()))?;
        apply_update(&mut staged_accounts[dest], &credit, false)
            .map_err(|e| GatewayError::TransferFailed(e.to_string()))?;

        let mut staged_transactions = guard.get(&transactions_ns).cloned().unwrap_or_default();
        for leg in [&plan.outgoing, &plan.incoming] {
            let mut record = bson::to_document(leg)
                .map_err(|e| GatewayError::TransferFailed(e.to_string()))?;
            record.insert("_id", ObjectId::new());
            self.check_unique(
                DEPOSIT_TRANSACTION_COLLECTION,
                &staged_transactions,
                &record,
                None,
            )
            .map_err(|e| GatewayError::TransferFailed(e.to_string()))?;
            staged_transactions.push(record);
        }

        guard.insert(accounts_ns, staged_accounts);
        guard.insert(transactions_ns, staged_transactions);
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        debug!(
            "Memory store enforces {} unique key sets",
            self.unique.values().map(Vec::len).sum::<usize>()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{DepositTransaction, TransactionType};
    use bson::{doc, DateTime};

    fn leg(
        id: &str,
        account: &str,
        tx_type: TransactionType,
        reference: &str,
    ) -> DepositTransaction {
        DepositTransaction {
            transactionid: id.into(),
            accountid: account.into(),
            tx_type,
            amount: 50.0,
            balanceafter: 0.0,
            datetime: DateTime::now(),
            description: "test".into(),
            referenceno: reference.into(),
            status: "completed".into(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new("coop_test");
        for (id, number, balance) in [("A", "1234567890", 100.0), ("B", "9876543210", 10.0)] {
            store
                .insert_one(
                    None,
                    DEPOSIT_ACCOUNT_COLLECTION,
                    doc! { "accountid": id, "accountnumber": number, "balance": balance },
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_member() {
        let store = MemoryStore::new("coop_test");
        store
            .insert_one(None, "members", doc! { "memberid": "M-1", "applicationid": "A-1" })
            .await
            .unwrap();
        let err = store
            .insert_one(None, "members", doc! { "memberid": "M-1", "applicationid": "A-2" })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
        assert_eq!(store.count(None, "members").await, 1);
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let store = MemoryStore::new("coop_test");
        store.insert_one(Some("other"), "loan_products", doc! { "productid": "P1" }).await.unwrap();
        assert_eq!(store.count(None, "loan_products").await, 0);
        assert_eq!(store.count(Some("other"), "loan_products").await, 1);
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new("coop_test");
        let first = store
            .update_one(
                None,
                "loan_tracking",
                doc! { "applicationid": "A-1" },
                doc! { "$set": { "stage": "review" } },
                true,
            )
            .await
            .unwrap();
        assert!(first.upserted_id.is_some());

        let second = store
            .update_one(
                None,
                "loan_tracking",
                doc! { "applicationid": "A-1" },
                doc! { "$set": { "stage": "approved" } },
                true,
            )
            .await
            .unwrap();
        assert_eq!((second.matched_count, second.modified_count), (1, 1));
        assert!(second.upserted_id.is_none());

        let stored = store
            .find_one(None, "loan_tracking", doc! { "applicationid": "A-1" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_str("stage").unwrap(), "approved");
    }

    #[tokio::test]
    async fn test_transfer_with_duplicate_leg_id_leaves_no_trace() {
        let store = seeded().await;
        store
            .insert_one(
                None,
                DEPOSIT_TRANSACTION_COLLECTION,
                doc! { "transactionid": "TXN-IN-1", "accountid": "B" },
            )
            .await
            .unwrap();

        let plan = TransferPlan {
            database: None,
            source_account_id: "A".into(),
            dest_account_id: "B".into(),
            amount: 50.0,
            outgoing: leg("TXN-OUT-1", "A", TransactionType::TransferOut, "B"),
            incoming: leg("TXN-IN-1", "B", TransactionType::TransferIn, "A"),
        };
        let err = store.apply_transfer(&plan).await.unwrap_err();
        assert!(matches!(err, GatewayError::TransferFailed(_)));

        let a = store
            .find_one(None, DEPOSIT_ACCOUNT_COLLECTION, doc! { "accountid": "A" })
            .await
            .unwrap()
            .unwrap();
        let b = store
            .find_one(None, DEPOSIT_ACCOUNT_COLLECTION, doc! { "accountid": "B" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.get_f64("balance").unwrap(), 100.0);
        assert_eq!(b.get_f64("balance").unwrap(), 10.0);
        assert_eq!(store.count(None, DEPOSIT_TRANSACTION_COLLECTION).await, 1);
    }

    #[tokio::test]
    async fn test_delete_many_removes_all_matches() {
        let store = MemoryStore::new("coop_test");
        for i in 0..3 {
            store
                .insert_one(None, "loan_payments", doc! { "applicationid": "A-1", "n": i })
                .await
                .unwrap();
        }
        store.insert_one(None, "loan_payments", doc! { "applicationid": "A-2" }).await.unwrap();

        let deleted = store
            .delete_many(None, "loan_payments", doc! { "applicationid": "A-1" })
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count(None, "loan_payments").await, 1);
    }

    #[tokio::test]
    async fn test_unique_key_compares_numbers_by_value() {
        let store = MemoryStore::new("coop_test");
        store
            .insert_one(None, "members", doc! { "memberid": 42_i32, "applicationid": "A-1" })
            .await
            .unwrap();
        let err = store
            .insert_one(None, "members", doc! { "memberid": 42_i64, "applicationid": "A-2" })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }
}
