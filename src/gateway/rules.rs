//! Business rules applied on the create and update paths
//!
//! Rules are keyed by target collection. The member duplicate check and the
//! KYC gate read the store outside any transaction, so they are advisory: the
//! unique indexes remain the authoritative guard against duplicates.

use bson::{doc, Bson, DateTime, Document};
use tracing::debug;
use uuid::Uuid;

use crate::db::schemas::{
    as_string, LoanApplication, LoanQuote, Member, TransactionType,
    DEPOSIT_ACCOUNT_COLLECTION, DEPOSIT_TRANSACTION_COLLECTION, LOAN_APPLICATION_COLLECTION,
    MEMBER_COLLECTION,
};
use crate::db::DocumentStore;
use crate::types::{GatewayError, Result};

/// Message returned when the member duplicate check fires
pub const DUPLICATE_MEMBER_MESSAGE: &str =
    "Member with this citizen ID or application ID already exists";

/// Message returned when the KYC gate rejects a transaction
pub const KYC_REQUIRED_MESSAGE: &str = "KYC verification required for this transaction";

/// What the create rules settled on for a new document
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub application_id: String,
    /// Derived loan fields, when the loan-math rule applied
    pub quote: Option<LoanQuote>,
}

/// Applies the per-collection rules against one target database
pub struct RuleInjector<'a> {
    store: &'a dyn DocumentStore,
    database: Option<&'a str>,
}

fn is_absent(document: &Document, key: &str) -> bool {
    matches!(document.get(key), None | Some(Bson::Null))
}

fn string_field(document: &Document, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(as_string)
        .filter(|s| !s.is_empty())
}

/// The stored value of an identifier field, unchanged, when it is set
fn identifier(document: &Document, key: &str) -> Option<Bson> {
    match document.get(key)? {
        Bson::Null => None,
        Bson::String(s) if s.is_empty() => None,
        value => Some(value.clone()),
    }
}

impl<'a> RuleInjector<'a> {
    pub fn new(store: &'a dyn DocumentStore, database: Option<&'a str>) -> Self {
        Self { store, database }
    }

    /// Run every create rule for `collection`, mutating `data` in place.
    ///
    /// Returns the identifier the document is stored under and, for loan
    /// applications, the derived loan fields.
    pub async fn prepare_create(
        &self,
        collection: &str,
        data: &mut Document,
    ) -> Result<PreparedDocument> {
        if collection == DEPOSIT_TRANSACTION_COLLECTION {
            self.check_kyc(data).await?;
        }
        if collection == MEMBER_COLLECTION {
            self.check_duplicate_member(data).await?;
        }

        let application_id = stamp_create(collection, data);
        let quote = if collection == LOAN_APPLICATION_COLLECTION {
            apply_loan_math(data)
        } else {
            None
        };

        Ok(PreparedDocument {
            application_id,
            quote,
        })
    }

    /// Run the update rules for `collection` on a `$set` payload
    pub fn prepare_update(&self, collection: &str, data: &mut Document) {
        data.insert("updatedat", DateTime::now());
        if collection == LOAN_APPLICATION_COLLECTION {
            apply_loan_math(data);
        }
    }

    /// Reject a member whose `memberid` or `applicationid` is already taken.
    ///
    /// Only identifiers present in the payload take part in the lookup.
    pub async fn check_duplicate_member(&self, data: &Document) -> Result<()> {
        let clauses: Vec<Document> = ["memberid", "applicationid"]
            .into_iter()
            .filter_map(|key| {
                identifier(data, key).map(|value| {
                    let mut clause = Document::new();
                    clause.insert(key, value);
                    clause
                })
            })
            .collect();
        if clauses.is_empty() {
            return Ok(());
        }

        let existing = self
            .store
            .find_one(self.database, MEMBER_COLLECTION, doc! { "$or": clauses })
            .await?;
        if existing.is_some() {
            debug!("Duplicate member rejected");
            return Err(GatewayError::Conflict(DUPLICATE_MEMBER_MESSAGE.to_string()));
        }
        Ok(())
    }

    /// Require a verified owner for member-initiated money movements
    pub async fn check_kyc(&self, data: &Document) -> Result<()> {
        let Some(account_id) = identifier(data, "accountid") else {
            return Ok(());
        };
        let tx_type = string_field(data, "type").unwrap_or_default();
        let status = string_field(data, "status");
        if !TransactionType::parse(&tx_type).requires_kyc(status.as_deref()) {
            return Ok(());
        }

        let account = self
            .store
            .find_one(
                self.database,
                DEPOSIT_ACCOUNT_COLLECTION,
                doc! { "accountid": account_id.clone() },
            )
            .await?
            .ok_or_else(|| GatewayError::Authorization("Account not found".to_string()))?;
        let member_id = identifier(&account, "memberid").ok_or_else(|| {
            GatewayError::Authorization("Member not found for this account".to_string())
        })?;

        let member = self
            .store
            .find_one(self.database, MEMBER_COLLECTION, doc! { "memberid": member_id })
            .await?
            .ok_or_else(|| GatewayError::Authorization("Member profile not found".to_string()))?;
        let member: Member = bson::from_document(member)?;

        if !member.kyc().is_verified() {
            debug!("KYC gate rejected {} on account {}", tx_type, account_id);
            return Err(GatewayError::Authorization(KYC_REQUIRED_MESSAGE.to_string()));
        }
        Ok(())
    }
}

/// Default the identifier and timestamps of a new document.
///
/// Returns the (possibly generated) application id.
pub fn stamp_create(collection: &str, data: &mut Document) -> String {
    if is_absent(data, "applicationid") {
        data.insert("applicationid", Uuid::new_v4().to_string());
    }
    let now = DateTime::now();
    for key in ["createdat", "updatedat"] {
        if is_absent(data, key) {
            data.insert(key, now);
        }
    }
    // transactionid carries a unique index, so it may not be left out
    if collection == DEPOSIT_TRANSACTION_COLLECTION && is_absent(data, "transactionid") {
        data.insert("transactionid", format!("TXN-{}", Uuid::new_v4()));
    }

    data.get("applicationid")
        .and_then(as_string)
        .unwrap_or_default()
}

/// Inject the flat-rate loan fields when all three inputs are numeric
pub fn apply_loan_math(data: &mut Document) -> Option<LoanQuote> {
    let quote = LoanApplication::from_document(data).terms()?.quote();
    quote.write_into(data);
    Some(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_stamp_create_keeps_given_values() {
        let mut data = doc! { "applicationid": "APP-1", "createdat": "yesterday" };
        let id = stamp_create("loan_applications", &mut data);
        assert_eq!(id, "APP-1");
        assert_eq!(data.get_str("createdat").unwrap(), "yesterday");
        assert!(data.get_datetime("updatedat").is_ok());
        assert!(!data.contains_key("transactionid"));
    }

    #[test]
    fn test_stamp_create_generates_ids() {
        let mut data = doc! { "applicationid": Bson::Null, "accountid": "A" };
        let id = stamp_create("deposit_transactions", &mut data);
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(data.get_str("transactionid").unwrap().starts_with("TXN-"));
    }

    #[test]
    fn test_loan_math_injection() {
        let mut data = doc! { "requestamount": 12000, "interestrate": 12.0, "requestterm": 12 };
        let quote = apply_loan_math(&mut data).unwrap();
        assert!((quote.installment_amount - 1120.0).abs() < 1e-9);
        assert!((data.get_f64("totalpayment").unwrap() - 13440.0).abs() < 1e-9);
        assert!((data.get_f64("totalinterest").unwrap() - 1440.0).abs() < 1e-9);
    }

    #[test]
    fn test_loan_math_silently_skips_incomplete_input() {
        let mut data = doc! { "requestamount": 12000, "interestrate": "twelve", "requestterm": 12 };
        assert!(apply_loan_math(&mut data).is_none());
        assert!(!data.contains_key("installmentamount"));
    }

    #[tokio::test]
    async fn test_duplicate_check_ignores_missing_identifiers() {
        let store = MemoryStore::new("coop_test");
        store
            .insert_one(None, MEMBER_COLLECTION, doc! { "memberid": "M-1", "applicationid": "A-1" })
            .await
            .unwrap();
        let rules = RuleInjector::new(&store, None);

        tokio_test::assert_ok!(rules.check_duplicate_member(&doc! { "firstname": "x" }).await);
        tokio_test::assert_ok!(rules.check_duplicate_member(&doc! { "memberid": "M-2" }).await);
        assert!(matches!(
            rules.check_duplicate_member(&doc! { "memberid": "M-9", "applicationid": "A-1" }).await,
            Err(GatewayError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_kyc_gate_paths() {
        let store = MemoryStore::new("coop_test");
        store
            .insert_one(
                None,
                DEPOSIT_ACCOUNT_COLLECTION,
                doc! { "accountid": "ACC-1", "memberid": "M-1" },
            )
            .await
            .unwrap();
        store
            .insert_one(
                None,
                MEMBER_COLLECTION,
                doc! { "memberid": "M-1", "kyc_status": "pending" },
            )
            .await
            .unwrap();
        let rules = RuleInjector::new(&store, None);

        let withdrawal = doc! { "accountid": "ACC-1", "type": "withdrawal" };
        let err = rules.check_kyc(&withdrawal).await.unwrap_err();
        assert_eq!(err.to_string(), KYC_REQUIRED_MESSAGE);

        // Completed deposits and unknown accounts on exempt types skip the gate
        let completed = doc! { "accountid": "ACC-1", "type": "deposit", "status": "completed" };
        assert!(rules.check_kyc(&completed).await.is_ok());
        assert!(rules.check_kyc(&doc! { "type": "withdrawal" }).await.is_ok());

        let err = rules
            .check_kyc(&doc! { "accountid": "ACC-404", "type": "pay" })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authorization(m) if m == "Account not found"));
    }

    #[test]
    fn test_identifier_keeps_stored_type() {
        let data = doc! { "accountid": 77_i64, "memberid": "", "applicationid": Bson::Null };
        assert_eq!(identifier(&data, "accountid"), Some(Bson::Int64(77)));
        assert_eq!(identifier(&data, "memberid"), None);
        assert_eq!(identifier(&data, "applicationid"), None);
        assert_eq!(identifier(&data, "missing"), None);
    }

    #[tokio::test]
    async fn test_kyc_gate_with_numeric_account() {
        let store = MemoryStore::new("coop_test");
        store
            .insert_one(
                None,
                DEPOSIT_ACCOUNT_COLLECTION,
                doc! { "accountid": 77_i64, "memberid": 42_i64 },
            )
            .await
            .unwrap();
        store
            .insert_one(None, MEMBER_COLLECTION, doc! { "memberid": 42, "kyc_status": "verified" })
            .await
            .unwrap();
        let rules = RuleInjector::new(&store, None);

        let withdrawal = doc! { "accountid": 77_i64, "type": "withdrawal" };
        tokio_test::assert_ok!(rules.check_kyc(&withdrawal).await);
        // the string form is a different key
        let err = rules
            .check_kyc(&doc! { "accountid": "77", "type": "withdrawal" })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authorization(m) if m == "Account not found"));
    }
}
