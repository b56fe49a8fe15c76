//! Generic CRUD dispatcher over whitelisted collections
//!
//! Every verb checks, in order: store availability, required fields, the
//! collection whitelist, payload size (create/update), then the business
//! rules, and only then touches the store. Each verb runs under one deadline.

use bson::{doc, Bson, Document};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::schemas::LoanQuote;
use crate::db::{DocumentStore, FindSpec, SharedStore, UpdateOutcome};
use crate::gateway::policy::CollectionPolicy;
use crate::gateway::rules::RuleInjector;
use crate::types::{GatewayError, Result};

/// Message returned by every verb while no store handle exists
pub const STORE_UNAVAILABLE_MESSAGE: &str = "MongoDB Atlas is not connected";

/// Body of a create request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub data: Option<Document>,
    /// Upsert keyed on `applicationid` instead of inserting
    #[serde(default)]
    pub upsert: bool,
}

/// Body of a get request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Option<Document>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

/// Body of an update request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Option<Document>,
    #[serde(default)]
    pub data: Option<Document>,
    #[serde(default)]
    pub upsert: bool,
}

/// Body of a delete request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Option<Document>,
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    /// `_id` of the inserted (or upserted) document; `None` when an upsert
    /// matched an existing document
    pub inserted_id: Option<Bson>,
    pub application_id: String,
    /// Derived loan fields, for `loan_applications` only
    pub quote: Option<LoanQuote>,
}

fn database_name(database: &Option<String>) -> Option<&str> {
    database.as_deref().filter(|d| !d.is_empty())
}

fn required_collection(collection: &Option<String>) -> Result<&str> {
    collection
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GatewayError::Validation("Collection name is required".to_string()))
}

fn required_filter(filter: Option<Document>) -> Result<Document> {
    filter.ok_or_else(|| GatewayError::Validation("Filter is required".to_string()))
}

fn required_data(data: Option<Document>) -> Result<Document> {
    data.filter(|d| !d.is_empty())
        .ok_or_else(|| GatewayError::Validation("Data field is required".to_string()))
}

/// Log a failed verb at the level its class deserves
fn log_failure(verb: &str, collection: Option<&str>, err: &GatewayError) {
    let collection = collection.unwrap_or("-");
    let code = err.status_code().as_u16();
    if code >= 500 {
        error!(
            "Gateway {} on {} failed ({}): {} {}",
            verb,
            collection,
            code,
            err,
            err.detail().unwrap_or_default()
        );
    } else {
        warn!("Gateway {} on {} rejected ({}): {}", verb, collection, code, err);
    }
}

/// The generic gateway
pub struct Gateway {
    store: Option<SharedStore>,
    policy: CollectionPolicy,
    timeout: Duration,
}

impl Gateway {
    pub fn new(store: Option<SharedStore>, policy: CollectionPolicy, timeout: Duration) -> Self {
        Self {
            store,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &CollectionPolicy {
        &self.policy
    }

    fn store(&self) -> Result<&dyn DocumentStore> {
        self.store
            .as_deref()
            .ok_or_else(|| GatewayError::Unavailable(STORE_UNAVAILABLE_MESSAGE.to_string()))
    }

    /// Fail with `Unavailable` while no store handle exists
    pub fn ensure_available(&self) -> Result<()> {
        self.store().map(|_| ())
    }

    async fn with_deadline<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| GatewayError::Timeout(format!("no response within {:?}", self.timeout)))?
    }

    /// Insert (or upsert) one document after running the create rules
    pub async fn create(&self, request: CreateRequest) -> Result<CreateOutcome> {
        let collection = request.collection.clone();
        let result = self.create_inner(request).await;
        match &result {
            Ok(outcome) => info!(
                "Created document in {} ({})",
                collection.as_deref().unwrap_or("-"),
                outcome.application_id
            ),
            Err(e) => log_failure("create", collection.as_deref(), e),
        }
        result
    }

    async fn create_inner(&self, request: CreateRequest) -> Result<CreateOutcome> {
        let store = self.store()?;
        let collection = required_collection(&request.collection)?;
        self.policy.authorize(collection)?;
        let mut data = required_data(request.data)?;
        self.policy.validate_size(&data)?;

        let database = database_name(&request.database);
        let rules = RuleInjector::new(store, database);

        self.with_deadline(async {
            let prepared = rules.prepare_create(collection, &mut data).await?;
            let application_id = prepared.application_id;

            let inserted_id = if request.upsert {
                // keyed on the stored value so numeric ids keep their type
                let key = data.get("applicationid").cloned().unwrap_or(Bson::Null);
                let filter = doc! { "applicationid": key };
                let outcome = store
                    .update_one(database, collection, filter, doc! { "$set": data }, true)
                    .await
                    .map_err(|e| e.with_context("Failed to create loan data"))?;
                outcome.upserted_id
            } else {
                let id = store
                    .insert_one(database, collection, data)
                    .await
                    .map_err(|e| e.with_context("Failed to create loan data"))?;
                Some(id)
            };

            Ok(CreateOutcome {
                inserted_id,
                application_id,
                quote: prepared.quote,
            })
        })
        .await
    }

    /// Query documents, newest `createdat` first
    pub async fn get(&self, request: GetRequest) -> Result<Vec<Document>> {
        let collection = request.collection.clone();
        let result = self.get_inner(request).await;
        if let Err(e) = &result {
            log_failure("get", collection.as_deref(), e);
        }
        result
    }

    async fn get_inner(&self, request: GetRequest) -> Result<Vec<Document>> {
        let store = self.store()?;
        let collection = required_collection(&request.collection)?;
        self.policy.authorize(collection)?;
        let filter = required_filter(request.filter)?;

        let spec = FindSpec {
            sort: Some(doc! { "createdat": -1 }),
            limit: (request.limit > 0).then_some(request.limit),
            skip: (request.skip > 0).then_some(request.skip as u64),
        };

        self.with_deadline(store.find(database_name(&request.database), collection, filter, spec))
            .await
            .map_err(|e| e.with_context("Failed to query documents"))
    }

    /// Merge `data` into the first document matching `filter`
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateOutcome> {
        let collection = request.collection.clone();
        let result = self.update_inner(request).await;
        match &result {
            Ok(outcome) => info!(
                "Updated {}: matched {}, modified {}",
                collection.as_deref().unwrap_or("-"),
                outcome.matched_count,
                outcome.modified_count
            ),
            Err(e) => log_failure("update", collection.as_deref(), e),
        }
        result
    }

    async fn update_inner(&self, request: UpdateRequest) -> Result<UpdateOutcome> {
        let store = self.store()?;
        let collection = required_collection(&request.collection)?;
        self.policy.authorize(collection)?;
        let filter = required_filter(request.filter)?;
        let mut data = required_data(request.data)?;
        self.policy.validate_size(&data)?;

        let database = database_name(&request.database);
        RuleInjector::new(store, database).prepare_update(collection, &mut data);

        self.with_deadline(store.update_one(
            database,
            collection,
            filter,
            doc! { "$set": data },
            request.upsert,
        ))
        .await
        .map_err(|e| e.with_context("Failed to update document"))
    }

    /// Remove every document matching `filter`, returning the count
    pub async fn delete(&self, request: DeleteRequest) -> Result<u64> {
        let collection = request.collection.clone();
        let result = self.delete_inner(request).await;
        match &result {
            Ok(deleted) => info!(
                "Deleted {} document(s) from {}",
                deleted,
                collection.as_deref().unwrap_or("-")
            ),
            Err(e) => log_failure("delete", collection.as_deref(), e),
        }
        result
    }

    async fn delete_inner(&self, request: DeleteRequest) -> Result<u64> {
        let store = self.store()?;
        let collection = required_collection(&request.collection)?;
        self.policy.authorize(collection)?;
        let filter = required_filter(request.filter)?;

        self.with_deadline(store.delete_many(database_name(&request.database), collection, filter))
            .await
            .map_err(|e| e.with_context("Failed to delete document"))
    }
}
