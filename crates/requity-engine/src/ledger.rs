//! Ledger client for payout settlement.
//!
//! The engine only needs two primitives from the money side: query the
//! operator balance and transfer the fixed reward to a recipient. The
//! production implementation talks to the payments HTTP service; tests
//! substitute a scriptable mock through the `LedgerClient` trait.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use requity_core::amount;

/// Ledger client errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Network-level failure. Transient; safe to retry later.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Payments API rejected the call. Transient unless the payload was bad.
    #[error("Payments API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed recipient address. Terminal; needs operator correction.
    #[error("Invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether retrying the same call later can reasonably succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. })
    }
}

/// Balance-query and transfer primitives consumed by the engine.
pub trait LedgerClient {
    /// Current spendable balance of `address`, in minor units.
    fn balance(&self, address: &str) -> impl Future<Output = Result<u64, LedgerError>>;

    /// Transfer `amount_minor` from the operator account to `recipient`.
    /// Returns the transaction id on success.
    fn transfer(
        &self,
        recipient: &str,
        amount_minor: u64,
        memo: Option<&str>,
    ) -> impl Future<Output = Result<String, LedgerError>>;
}

/// Validate a wallet address: base58 alphabet, 32 to 44 characters.
pub fn validate_address(address: &str) -> Result<(), LedgerError> {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    if !(32..=44).contains(&address.len()) {
        return Err(LedgerError::InvalidAddress(format!(
            "{address:?} has invalid length {}",
            address.len()
        )));
    }
    if let Some(c) = address.chars().find(|c| !BASE58.contains(*c)) {
        return Err(LedgerError::InvalidAddress(format!(
            "{address:?} contains non-base58 character {c:?}"
        )));
    }
    Ok(())
}

/// Client for the payments HTTP service (`/api/payments/*`).
#[derive(Debug)]
pub struct PaymentsApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendData {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    pyusd: f64,
}

impl PaymentsApiClient {
    /// Create a new payments API client.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        if base_url.is_empty() {
            return Err(LedgerError::Config("api_base_url is empty".into()));
        }

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Build the payments API URL for a given path.
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/payments{path}", self.base_url)
    }

    /// Unwrap the `{success, data, error}` envelope every endpoint returns.
    fn unwrap_envelope<T>(status: u16, envelope: ApiEnvelope<T>) -> Result<T, LedgerError> {
        if !envelope.success {
            return Err(LedgerError::Api {
                status,
                message: envelope.error.unwrap_or_else(|| "Unknown".into()),
            });
        }
        envelope.data.ok_or(LedgerError::Api {
            status,
            message: "missing data in successful response".into(),
        })
    }
}

impl LedgerClient for PaymentsApiClient {
    /// Query the operator wallet balance.
    ///
    /// The payments service reports its own configured wallet; `address` is
    /// accepted for interface symmetry but not sent over the wire.
    async fn balance(&self, _address: &str) -> Result<u64, LedgerError> {
        let resp = self
            .http
            .get(self.api_url("/balance"))
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let status = resp.status().as_u16();
        let envelope: ApiEnvelope<BalanceData> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let data = Self::unwrap_envelope(status, envelope)?;
        Ok(amount::from_tokens_f64(data.pyusd))
    }

    async fn transfer(
        &self,
        recipient: &str,
        amount_minor: u64,
        memo: Option<&str>,
    ) -> Result<String, LedgerError> {
        let mut body = serde_json::json!({
            "recipientAddress": recipient,
            "amount": amount::to_tokens_f64(amount_minor),
        });
        if let Some(memo) = memo {
            body["memo"] = serde_json::Value::String(memo.to_string());
        }

        let resp = self
            .http
            .post(self.api_url("/send-direct"))
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let status = resp.status().as_u16();
        let envelope: ApiEnvelope<SendData> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let data = Self::unwrap_envelope(status, envelope)?;
        Ok(data.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wellformed_addresses() {
        assert!(validate_address("TRmpNVZEhNr5DawcGF4HfY8bppTazRwVj6zzL3ZZjNG").is_ok());
        assert!(validate_address("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").is_ok());
    }

    #[test]
    fn rejects_bad_length() {
        assert!(matches!(
            validate_address("tooshort"),
            Err(LedgerError::InvalidAddress(_))
        ));
        let long = "1".repeat(45);
        assert!(validate_address(&long).is_err());
    }

    #[test]
    fn rejects_non_base58_characters() {
        // '0', 'O', 'I' and 'l' are not part of the base58 alphabet
        let addr = "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl";
        assert!(matches!(
            validate_address(addr),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(LedgerError::Http("reset".into()).is_transient());
        assert!(
            LedgerError::Api {
                status: 500,
                message: "oops".into()
            }
            .is_transient()
        );
        assert!(!LedgerError::InvalidAddress("x".into()).is_transient());
        assert!(!LedgerError::Config("x".into()).is_transient());
    }

    #[test]
    fn client_rejects_empty_base_url() {
        assert!(matches!(
            PaymentsApiClient::new("", Duration::from_secs(1)),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn base_url_is_trimmed() {
        let client =
            PaymentsApiClient::new("http://127.0.0.1:3001/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.api_url("/balance"),
            "http://127.0.0.1:3001/api/payments/balance"
        );
    }
}
