//! MongoDB client and store implementation
//!
//! One [`MongoClient`] is created at startup and shared by every request; the
//! driver manages its own connection pool.

use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, ClientSession, Collection, Database, IndexModel,
};
use tracing::{info, warn};

use crate::db::schemas::{index_plan, DEPOSIT_ACCOUNT_COLLECTION, DEPOSIT_TRANSACTION_COLLECTION};
use crate::db::store::{DocumentStore, FindSpec, TransferPlan, UpdateOutcome};
use crate::types::{GatewayError, Result};

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    const COLLECTION: &'static str;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the connection with a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB");

        // Bound server selection so an unreachable cluster fails startup quickly
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=10000&connectTimeoutMS=10000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=10000&connectTimeoutMS=10000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::Unavailable(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Requested database, or the default one when none is named
    pub fn database(&self, name: Option<&str>) -> Database {
        match name {
            Some(name) if !name.is_empty() => self.client.database(name),
            _ => self.client.database(&self.db_name),
        }
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the default database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Close all pooled connections
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        info!("Disconnected from MongoDB");
    }
}

/// [`DocumentStore`] backed by MongoDB
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
}

impl MongoStore {
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    fn collection(&self, database: Option<&str>, name: &str) -> Collection<Document> {
        self.client.database(database).collection::<Document>(name)
    }

    /// The four writes of a transfer, inside an already started transaction
    async fn transfer_writes(
        &self,
        plan: &TransferPlan,
        session: &mut ClientSession,
    ) -> Result<()> {
        let database = plan.database.as_deref();
        let accounts = self.collection(database, DEPOSIT_ACCOUNT_COLLECTION);
        let transactions = self.collection(database, DEPOSIT_TRANSACTION_COLLECTION);

        let debit = accounts
            .update_one(
                doc! { "accountid": &plan.source_account_id },
                doc! { "$inc": { "balance": -plan.amount } },
            )
            .session(&mut *session)
            .await?;
        if debit.matched_count != 1 {
            return Err(GatewayError::NotFound("Source account not found".into()));
        }

        let credit = accounts
            .update_one(
                doc! { "accountid": &plan.dest_account_id },
                doc! { "$inc": { "balance": plan.amount } },
            )
            .session(&mut *session)
            .await?;
        if credit.matched_count != 1 {
            return Err(GatewayError::NotFound("Destination account not found".into()));
        }

        let legs = vec![
            bson::to_document(&plan.outgoing)?,
            bson::to_document(&plan.incoming)?,
        ];
        transactions.insert_many(legs).session(&mut *session).await?;

        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn write_error(context: &str, err: mongodb::error::Error) -> GatewayError {
    if is_duplicate_key(&err) {
        GatewayError::Conflict("Document with this unique key already exists".to_string())
    } else {
        GatewayError::database(context, err)
    }
}

/// Detail string for a failure inside the transfer unit of work
fn transfer_detail(err: &GatewayError) -> String {
    err.detail().map(str::to_string).unwrap_or_else(|| err.to_string())
}

#[async_trait::async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn find_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.collection(database, collection)
            .find_one(filter)
            .await
            .map_err(|e| GatewayError::database("Failed to query documents", e))
    }

    async fn find(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(database, collection);
        let mut action = coll.find(filter);
        if let Some(sort) = spec.sort {
            action = action.sort(sort);
        }
        if let Some(limit) = spec.limit {
            action = action.limit(limit);
        }
        if let Some(skip) = spec.skip {
            action = action.skip(skip);
        }

        let cursor = action
            .await
            .map_err(|e| GatewayError::database("Failed to query documents", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| GatewayError::database("Failed to decode documents", e))
    }

    async fn insert_one(
        &self,
        database: Option<&str>,
        collection: &str,
        document: Document,
    ) -> Result<Bson> {
        self.collection(database, collection)
            .insert_one(document)
            .await
            .map(|result| result.inserted_id)
            .map_err(|e| write_error("Failed to create document", e))
    }

    async fn update_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let result = self
            .collection(database, collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|e| write_error("Failed to update document", e))?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
    ) -> Result<u64> {
        self.collection(database, collection)
            .delete_many(filter)
            .await
            .map(|result| result.deleted_count)
            .map_err(|e| GatewayError::database("Failed to delete documents", e))
    }

    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<()> {
        let mut session = self
            .client
            .inner()
            .start_session()
            .await
            .map_err(|e| GatewayError::TransferFailed(format!("failed to start session: {}", e)))?;

        session
            .start_transaction()
            .await
            .map_err(|e| {
                GatewayError::TransferFailed(format!("failed to start transaction: {}", e))
            })?;

        if let Err(err) = self.transfer_writes(plan, &mut session).await {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("Abort after failed transfer write also failed: {}", abort_err);
            }
            return Err(GatewayError::TransferFailed(transfer_detail(&err)));
        }

        if let Err(err) = session.commit_transaction().await {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("Abort after failed commit also failed: {}", abort_err);
            }
            return Err(GatewayError::TransferFailed(format!("commit failed: {}", err)));
        }

        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        for (collection, indexes) in index_plan() {
            let models: Vec<IndexModel> = indexes
                .into_iter()
                .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
                .collect();

            self.collection(None, collection)
                .create_indexes(models)
                .await
                .map_err(|e| {
                    GatewayError::database(
                        format!("Failed to create indexes for {}", collection),
                        e,
                    )
                })?;
        }

        info!("Indexes ensured successfully");
        Ok(())
    }
}
