//! Loan application and loan product schemas
//!
//! Loan applications carry three derived fields computed with the flat-rate
//! formula: interest is charged once on the full principal over the whole
//! term, then spread evenly across the installments.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::Deserialize;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{lenient_f64, lenient_string, plain_index, unique_index};

/// Collection name for loan applications
pub const LOAN_APPLICATION_COLLECTION: &str = "loan_applications";

/// Collection name for loan products
pub const LOAN_PRODUCT_COLLECTION: &str = "loan_products";

/// Loan application inputs read by the loan-math rule
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct LoanApplication {
    #[serde(deserialize_with = "lenient_string")]
    pub applicationid: Option<String>,

    /// Principal requested
    #[serde(deserialize_with = "lenient_f64")]
    pub requestamount: Option<f64>,

    /// Annual interest rate in percent
    #[serde(deserialize_with = "lenient_f64")]
    pub interestrate: Option<f64>,

    /// Term in months
    #[serde(deserialize_with = "lenient_f64")]
    pub requestterm: Option<f64>,
}

impl LoanApplication {
    /// Read the application fields out of an untyped payload
    pub fn from_document(document: &Document) -> Self {
        bson::from_document(document.clone()).unwrap_or_default()
    }

    /// Loan terms, when all three inputs are present and numeric.
    ///
    /// Fractional terms are truncated to whole months; a term below one
    /// month yields no terms.
    pub fn terms(&self) -> Option<LoanTerms> {
        let amount = self.requestamount?;
        let annual_rate = self.interestrate?;
        let term = self.requestterm?.trunc();
        if term < 1.0 || term > f64::from(u32::MAX) {
            return None;
        }
        Some(LoanTerms {
            amount,
            annual_rate,
            term_months: term as u32,
        })
    }
}

/// Validated inputs of the flat-rate formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub amount: f64,
    pub annual_rate: f64,
    pub term_months: u32,
}

impl LoanTerms {
    /// Installment per month under flat-rate interest
    pub fn installment(&self) -> f64 {
        let term = f64::from(self.term_months);
        let total_interest = self.amount * (self.annual_rate / 100.0) * (term / 12.0);
        let total_payment = self.amount + total_interest;
        total_payment / term
    }

    /// Derived fields; `total_payment` is always `installment × term`
    pub fn quote(&self) -> LoanQuote {
        let installment_amount = self.installment();
        let total_payment = installment_amount * f64::from(self.term_months);
        LoanQuote {
            installment_amount,
            total_payment,
            total_interest: total_payment - self.amount,
        }
    }
}

/// Derived loan fields injected into the stored application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanQuote {
    pub installment_amount: f64,
    pub total_payment: f64,
    pub total_interest: f64,
}

impl LoanQuote {
    pub fn write_into(&self, document: &mut Document) {
        document.insert("installmentamount", self.installment_amount);
        document.insert("totalpayment", self.total_payment);
        document.insert("totalinterest", self.total_interest);
    }
}

impl IntoIndexes for LoanApplication {
    const COLLECTION: &'static str = LOAN_APPLICATION_COLLECTION;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            plain_index(doc! { "memberid": 1, "email": 1 }, "memberid_email_index"),
            plain_index(doc! { "status": 1 }, "status_index"),
            plain_index(doc! { "requestdate": -1 }, "requestdate_desc"),
            unique_index(doc! { "applicationid": 1 }, "applicationid_unique"),
            plain_index(doc! { "productid": 1 }, "productid_index"),
            plain_index(doc! { "applicantinfo.mobile": 1 }, "applicant_mobile_index"),
        ]
    }
}

/// Loan product catalog entry; only its indexes are managed here
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct LoanProduct {
    #[serde(deserialize_with = "lenient_string")]
    pub productid: Option<String>,

    #[serde(deserialize_with = "lenient_f64")]
    pub maxamount: Option<f64>,

    #[serde(deserialize_with = "lenient_f64")]
    pub interestrate: Option<f64>,
}

impl IntoIndexes for LoanProduct {
    const COLLECTION: &'static str = LOAN_PRODUCT_COLLECTION;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            unique_index(doc! { "productid": 1 }, "productid_unique"),
            plain_index(doc! { "maxamount": 1 }, "maxamount_index"),
            plain_index(doc! { "interestrate": 1 }, "interestrate_index"),
        ]
    }
}
