//! Domain ownership verification.
//!
//! A publisher proves control of a domain by publishing the registration's
//! verification token either in a well-known file or in a homepage meta
//! tag. Both checks hit the public web; a fetch error or timeout counts as
//! a failed check and falls through to the next one, never crashing the
//! engine. Verification is operator-retriable, so no retries happen here.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Marker string embedded in well-known files and meta tag names.
pub const VERIFICATION_MARKER: &str = "requity-verification";

/// File name under `/.well-known/` that carries the token.
pub const WELL_KNOWN_FILE: &str = "requity-verification.txt";

/// Domain verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Invalid verification pattern: {0}")]
    Pattern(String),
}

/// Seam for the engine's ownership check, so tests can script outcomes
/// without touching the network.
pub trait OwnershipCheck {
    /// Returns `Ok(true)` only when the domain demonstrably serves the
    /// expected token.
    fn verify(
        &self,
        domain: &str,
        expected_token: &str,
    ) -> impl Future<Output = Result<bool, VerifyError>>;
}

/// Production verifier fetching the well-known file and the homepage over
/// HTTPS with a bounded per-fetch timeout.
#[derive(Debug)]
pub struct HttpDomainVerifier {
    http: reqwest::Client,
}

impl HttpDomainVerifier {
    pub fn new(fetch_timeout: Duration) -> Result<Self, VerifyError> {
        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| VerifyError::Http(e.to_string()))?;
        Ok(Self { http })
    }

    /// Fetch a URL, returning the body only for 2xx responses. Network
    /// errors and non-success statuses yield `None`.
    async fn fetch_text(&self, url: &str) -> Option<String> {
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!(url, status = %resp.status(), "verification fetch returned non-success");
                None
            }
            Err(e) => {
                debug!(url, error = %e, "verification fetch failed");
                None
            }
        }
    }
}

impl OwnershipCheck for HttpDomainVerifier {
    async fn verify(&self, domain: &str, expected_token: &str) -> Result<bool, VerifyError> {
        // Method 1: well-known file
        let well_known_url = format!("https://{domain}/.well-known/{WELL_KNOWN_FILE}");
        if let Some(body) = self.fetch_text(&well_known_url).await {
            if well_known_matches(&body, expected_token) {
                return Ok(true);
            }
        }

        // Method 2: homepage meta tag
        if let Some(html) = self.fetch_text(&format!("https://{domain}/")).await {
            if html_has_meta_token(&html, expected_token)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// True when the well-known file body contains the expected marker line.
pub fn well_known_matches(body: &str, expected_token: &str) -> bool {
    body.contains(&format!("{VERIFICATION_MARKER}={expected_token}"))
}

/// True when the HTML contains a verification meta tag whose `content`
/// equals the expected token. Tag and attribute matching is
/// case-insensitive and accepts either quote style and a self-closing tag.
pub fn html_has_meta_token(html: &str, expected_token: &str) -> Result<bool, VerifyError> {
    let pattern = format!(
        r#"<meta\s+name=["']{VERIFICATION_MARKER}["']\s+content=["']{}["']\s*/?>"#,
        regex::escape(expected_token)
    );
    let re = regex::RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| VerifyError::Pattern(e.to_string()))?;
    Ok(re.is_match(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "deadbeefcafe";

    #[test]
    fn well_known_requires_marker_and_token() {
        assert!(well_known_matches("requity-verification=deadbeefcafe", TOKEN));
        assert!(well_known_matches(
            "# verification file\nrequity-verification=deadbeefcafe\n",
            TOKEN
        ));
        assert!(!well_known_matches("requity-verification=wrongtoken", TOKEN));
        assert!(!well_known_matches("deadbeefcafe", TOKEN));
    }

    #[test]
    fn meta_tag_matches_both_quote_styles() {
        let double = r#"<html><head><meta name="requity-verification" content="deadbeefcafe"></head></html>"#;
        let single = r"<meta name='requity-verification' content='deadbeefcafe'>";
        assert!(html_has_meta_token(double, TOKEN).unwrap());
        assert!(html_has_meta_token(single, TOKEN).unwrap());
    }

    #[test]
    fn meta_tag_matching_is_case_insensitive_and_self_close_tolerant() {
        let upper = r#"<META NAME="REQUITY-VERIFICATION" CONTENT="deadbeefcafe" />"#;
        assert!(html_has_meta_token(upper, TOKEN).unwrap());
    }

    #[test]
    fn meta_tag_rejects_wrong_token() {
        let html = r#"<meta name="requity-verification" content="other">"#;
        assert!(!html_has_meta_token(html, TOKEN).unwrap());
    }

    #[test]
    fn meta_tag_token_is_regex_escaped() {
        // A token containing regex metacharacters must not match arbitrarily.
        let html = r#"<meta name="requity-verification" content="aaaa">"#;
        assert!(!html_has_meta_token(html, "a.*a").unwrap());
    }

    #[test]
    fn unrelated_meta_tags_do_not_match() {
        let html = r#"<meta name="description" content="deadbeefcafe">"#;
        assert!(!html_has_meta_token(html, TOKEN).unwrap());
    }
}
