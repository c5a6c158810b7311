//! Data model for website attribution and payout escrow.
//!
//! Field names serialize in camelCase to match the persisted state layout
//! consumed by the storefront and extension collaborators.

use serde::{Deserialize, Serialize};

use crate::amount;

/// A registered publisher website, one per distinct normalized domain.
///
/// Created on first registration (or auto-registration triggered by an
/// unrecognized conversion domain), mutated by verification and by every
/// conversion, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteRegistration {
    /// Stable short id, derived at creation time. Immutable.
    pub website_id: String,
    /// Lower-cased, scheme-stripped hostname. Unique lookup key.
    pub domain: String,
    /// Wallet address that receives payouts.
    pub owner: String,
    /// Random token proving domain control. Generated once, never rotated.
    pub verification_token: String,
    /// Starts false; flips to true exactly once, never reverts.
    pub is_verified: bool,
    /// Unix seconds at registration.
    pub registration_timestamp: i64,
    /// Monotonic conversion counter.
    pub total_conversions: u64,
    /// Cumulative minor units actually disbursed (immediate or claimed).
    #[serde(with = "amount::serde_string")]
    pub total_earnings: u64,
}

/// One attributed sale. Immutable once created, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub website_id: String,
    pub conversion_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// Fixed payout unit in minor units, not the sale price.
    #[serde(with = "amount::serde_string")]
    pub amount: u64,
    pub source_url: String,
    /// The external order id the sale landed on.
    pub destination_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_data: Option<serde_json::Value>,
}

/// Escrow status for a payout awaiting verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Awaiting a successful drain. The only non-terminal state.
    Pending,
    /// Disbursed via escrow drain. Terminal.
    Claimed,
    /// Expired by policy. Terminal, reserved for a future expiry hook.
    Expired,
}

impl PayoutStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Escrow record for a conversion whose website was not verified (or whose
/// immediate payout failed) at conversion time. Exactly one exists per
/// conversion that was not paid immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayout {
    pub website_id: String,
    pub domain: String,
    pub conversion_id: String,
    #[serde(with = "amount::serde_string")]
    pub amount: u64,
    pub timestamp: i64,
    pub source_url: String,
    pub status: PayoutStatus,
}

/// Normalize a domain for registry lookup: lower-case, strip scheme and any
/// path/query/fragment, drop a trailing dot.
pub fn normalize_domain(input: &str) -> String {
    let s = input.trim().to_ascii_lowercase();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(&s);
    let host = s.split(['/', '?', '#']).next().unwrap_or("");
    host.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_and_path() {
        assert_eq!(normalize_domain("Example.COM"), "example.com");
        assert_eq!(normalize_domain("https://example.com/"), "example.com");
        assert_eq!(
            normalize_domain("http://shop.example.com/products?id=1"),
            "shop.example.com"
        );
        assert_eq!(normalize_domain("example.com."), "example.com");
        assert_eq!(normalize_domain("  example.com  "), "example.com");
    }

    #[test]
    fn registration_serializes_camel_case_with_string_earnings() {
        let reg = WebsiteRegistration {
            website_id: "abc123".into(),
            domain: "example.com".into(),
            owner: "wallet".into(),
            verification_token: "tok".into(),
            is_verified: false,
            registration_timestamp: 1_700_000_000,
            total_conversions: 2,
            total_earnings: 200_000,
        };
        let json = serde_json::to_string(&reg).unwrap();
        assert!(json.contains(r#""websiteId":"abc123""#));
        assert!(json.contains(r#""isVerified":false"#));
        assert!(json.contains(r#""totalEarnings":"200000""#));

        let back: WebsiteRegistration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_earnings, 200_000);
    }

    #[test]
    fn payout_status_round_trips() {
        let p = PendingPayout {
            website_id: "w".into(),
            domain: "example.com".into(),
            conversion_id: "c".into(),
            amount: 100_000,
            timestamp: 0,
            source_url: "https://example.com/p".into(),
            status: PayoutStatus::Pending,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""status":"pending""#));
        let back: PendingPayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, PayoutStatus::Pending);
        assert_eq!(PayoutStatus::Claimed.to_string(), "claimed");
    }

    #[test]
    fn optional_conversion_fields_are_omitted() {
        let ev = ConversionEvent {
            website_id: "w".into(),
            conversion_id: "c".into(),
            timestamp: 0,
            amount: 100_000,
            source_url: "https://example.com/p".into(),
            destination_url: "ORDER_1".into(),
            user_agent: None,
            referrer_data: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(!json.contains("userAgent"));
        assert!(!json.contains("referrerData"));
    }
}
