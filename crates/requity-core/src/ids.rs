//! Identifier and verification-token derivation.
//!
//! Website and conversion ids are short deterministic SHA-256 prefixes so
//! they stay stable and collision-resistant; verification tokens come from
//! the OS RNG and must be unguessable.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Length in hex characters of derived short ids.
const SHORT_ID_LEN: usize = 16;

/// Number of random bytes in a verification token (64 hex chars).
const TOKEN_BYTES: usize = 32;

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(SHORT_ID_LEN);
    id
}

/// Derive a website id from its normalized domain and the registration
/// instant. Immutable once assigned.
pub fn website_id(domain: &str, registered_at: i64) -> String {
    short_hash(&format!("{domain}-{registered_at}"))
}

/// Derive a conversion id from the website id, the external order id, and
/// the conversion instant.
pub fn conversion_id(website_id: &str, order_id: &str, timestamp: i64) -> String {
    short_hash(&format!("{website_id}-{order_id}-{timestamp}"))
}

/// Generate a fresh random verification token.
pub fn verification_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_id_is_deterministic_and_short() {
        let a = website_id("example.com", 1_700_000_000);
        let b = website_id("example.com", 1_700_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_inputs_give_different_ids() {
        assert_ne!(
            website_id("example.com", 1_700_000_000),
            website_id("example.org", 1_700_000_000)
        );
        assert_ne!(
            conversion_id("abc", "ORDER_1", 1),
            conversion_id("abc", "ORDER_2", 1)
        );
    }

    #[test]
    fn tokens_are_unique_and_hex() {
        let t1 = verification_token();
        let t2 = verification_token();
        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 64);
        assert!(t1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
