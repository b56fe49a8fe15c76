//! Collection policy: which collections the gateway may touch, and how big a
//! payload may be.

use bson::Document;
use std::collections::HashSet;

use crate::config::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::types::{GatewayError, Result};

/// Collections reachable through the generic gateway
pub const ALLOWED_COLLECTIONS: [&str; 12] = [
    "loan_applications",
    "loan_products",
    "loan_tracking",
    "loan_documents",
    "loan_payments",
    "deposit_accounts",
    "deposit_transactions",
    "members",
    "share_accounts",
    "share_transactions",
    "dividend_rates",
    "dividend_payments",
];

#[derive(Debug, Clone)]
pub struct CollectionPolicy {
    allowed: HashSet<&'static str>,
    max_document_bytes: usize,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

impl CollectionPolicy {
    pub fn new(max_document_bytes: usize) -> Self {
        Self {
            allowed: ALLOWED_COLLECTIONS.into_iter().collect(),
            max_document_bytes,
        }
    }

    pub fn is_allowed(&self, collection: &str) -> bool {
        self.allowed.contains(collection)
    }

    /// Reject collections outside the allow-set
    pub fn authorize(&self, collection: &str) -> Result<()> {
        if self.is_allowed(collection) {
            Ok(())
        } else {
            Err(GatewayError::Authorization("Collection not allowed".to_string()))
        }
    }

    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    /// Reject a payload whose encoded size exceeds the ceiling.
    ///
    /// The size is measured on the BSON encoding, which is what the store
    /// limit applies to.
    pub fn validate_size(&self, document: &Document) -> Result<()> {
        let mut encoded = Vec::new();
        document.to_writer(&mut encoded)?;
        if encoded.len() > self.max_document_bytes {
            return Err(GatewayError::PayloadTooLarge(format!(
                "Data size exceeds limit ({} > {} bytes)",
                encoded.len(),
                self.max_document_bytes
            )));
        }
        Ok(())
    }
}
