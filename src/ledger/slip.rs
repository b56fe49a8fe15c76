//! Settlement summary returned after a transfer, for receipt rendering

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Render an account number as `first3-xxx-last4`.
///
/// Numbers shorter than seven characters are returned unmasked.
pub fn mask_account_number(account_number: &str) -> String {
    let chars: Vec<char> = account_number.chars().collect();
    if chars.len() < 7 {
        return account_number.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}-xxx-{}", head, tail)
}

/// One side of the transfer as printed on the slip
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccountInfo {
    pub name: String,
    pub account_no_masked: String,
    pub bank_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlipInfo {
    /// Identifier of the outgoing leg
    pub transaction_ref: String,
    pub transaction_date: DateTime<Utc>,
    pub sender: AccountInfo,
    pub receiver: AccountInfo,
    pub amount: f64,
    pub qr_payload: String,
}

/// Bank details and QR base printed on every slip
#[derive(Debug, Clone)]
pub struct SlipSettings {
    pub bank_name: String,
    pub bank_code: String,
    pub qr_verify_base_url: String,
}

impl Default for SlipSettings {
    fn default() -> Self {
        Self {
            bank_name: "Coop Saving".to_string(),
            bank_code: "COOP".to_string(),
            qr_verify_base_url: "https://coopapp.com".to_string(),
        }
    }
}

impl SlipSettings {
    pub fn qr_payload(&self, transaction_ref: &str) -> String {
        format!(
            "{}/verify?ref={}",
            self.qr_verify_base_url.trim_end_matches('/'),
            transaction_ref
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_account_number() {
        assert_eq!(mask_account_number("1234567890"), "123-xxx-7890");
        assert_eq!(mask_account_number("1234567"), "123-xxx-4567");
        assert_eq!(mask_account_number("123456"), "123456");
        assert_eq!(mask_account_number(""), "");
    }

    #[test]
    fn test_qr_payload() {
        let settings = SlipSettings::default();
        assert_eq!(
            settings.qr_payload("TXN-OUT-1"),
            "https://coopapp.com/verify?ref=TXN-OUT-1"
        );
    }

    #[test]
    fn test_sender_omits_bank_code() {
        let info = AccountInfo {
            name: "Somchai".into(),
            account_no_masked: "123-xxx-7890".into(),
            bank_name: "Coop Saving".into(),
            bank_code: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("bank_code").is_none());
    }
}
