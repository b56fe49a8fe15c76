//! Member document schema
//!
//! Only the identity keys and the KYC state are typed; the rest of the
//! profile is owned by the member/KYC services.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::Deserialize;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{lenient_string, plain_index, unique_index};

/// Collection name for members
pub const MEMBER_COLLECTION: &str = "members";

/// Member profile as read by the business rules
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Member {
    /// Business key (citizen-id derived), unique
    #[serde(deserialize_with = "lenient_string")]
    pub memberid: Option<String>,

    /// Loan application this member was created from, unique
    #[serde(deserialize_with = "lenient_string")]
    pub applicationid: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub kyc_status: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub role: Option<String>,
}

/// KYC review state of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycStatus {
    Unset,
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("pending") => Self::Pending,
            Some("verified") => Self::Verified,
            Some("rejected") => Self::Rejected,
            _ => Self::Unset,
        }
    }

    pub fn is_verified(self) -> bool {
        self == Self::Verified
    }
}

impl Member {
    pub fn kyc(&self) -> KycStatus {
        KycStatus::parse(self.kyc_status.as_deref())
    }
}

impl IntoIndexes for Member {
    const COLLECTION: &'static str = MEMBER_COLLECTION;

    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            unique_index(doc! { "memberid": 1 }, "memberid_unique"),
            unique_index(doc! { "applicationid": 1 }, "applicationid_unique"),
            plain_index(doc! { "mobile": 1 }, "mobile_index"),
            plain_index(doc! { "created_at": -1 }, "created_at_desc"),
        ]
    }
}
