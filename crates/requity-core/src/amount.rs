//! Fixed-point payout amounts.
//!
//! All amounts are integer PYUSD minor units (6 decimals) in memory and in
//! persisted state, serialized as decimal strings of minor units so large
//! values survive JSON round-trips without precision loss. The payments API
//! speaks whole PYUSD, so conversion helpers to and from the decimal token
//! representation live here as well.

use crate::error::{Error, Result};

/// Number of decimal places in a PYUSD amount.
pub const DECIMALS: u32 = 6;

/// Minor units per whole PYUSD token.
pub const MINOR_UNITS_PER_TOKEN: u64 = 1_000_000;

/// Format minor units as a human-readable token amount, e.g. `100000` ->
/// `"0.1"`, `2_500_000` -> `"2.5"`, `3_000_000` -> `"3"`.
pub fn to_token_string(minor: u64) -> String {
    let whole = minor / MINOR_UNITS_PER_TOKEN;
    let frac = minor % MINOR_UNITS_PER_TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:06}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Convert minor units to the whole-token float the payments API expects.
///
/// Exact for any realistic payout size (minor units below 2^53).
#[allow(clippy::cast_precision_loss)]
pub fn to_tokens_f64(minor: u64) -> f64 {
    minor as f64 / MINOR_UNITS_PER_TOKEN as f64
}

/// Convert a whole-token float from the payments API into minor units,
/// rounding to the nearest unit.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn from_tokens_f64(tokens: f64) -> u64 {
    if tokens <= 0.0 {
        return 0;
    }
    (tokens * MINOR_UNITS_PER_TOKEN as f64).round() as u64
}

/// Parse a decimal token string (e.g. `"0.1"` or `"12"`) into minor units.
///
/// At most 6 fractional digits are accepted; anything else is an error
/// rather than a silent rounding.
pub fn parse_tokens(input: &str) -> Result<u64> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::Amount("empty amount".into()));
    }
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(Error::Amount(format!("not a number: {input:?}")));
    }
    if frac.len() as u32 > DECIMALS {
        return Err(Error::Amount(format!(
            "more than {DECIMALS} decimal places: {input:?}"
        )));
    }
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| Error::Amount(format!("not a number: {input:?}")))?
    };
    let frac_minor: u64 = if frac.is_empty() {
        0
    } else {
        let digits: u64 = frac
            .parse()
            .map_err(|_| Error::Amount(format!("not a number: {input:?}")))?;
        digits * 10u64.pow(DECIMALS - frac.len() as u32)
    };
    whole
        .checked_mul(MINOR_UNITS_PER_TOKEN)
        .and_then(|w| w.checked_add(frac_minor))
        .ok_or_else(|| Error::Amount(format!("amount overflows: {input:?}")))
}

/// Serde adapter serializing a `u64` minor-unit amount as a decimal string.
pub mod serde_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid amount string {s:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_string_formatting() {
        assert_eq!(to_token_string(0), "0");
        assert_eq!(to_token_string(100_000), "0.1");
        assert_eq!(to_token_string(1_000_000), "1");
        assert_eq!(to_token_string(2_500_000), "2.5");
        assert_eq!(to_token_string(1), "0.000001");
    }

    #[test]
    fn parse_whole_and_fractional() {
        assert_eq!(parse_tokens("0.1").unwrap(), 100_000);
        assert_eq!(parse_tokens("12").unwrap(), 12_000_000);
        assert_eq!(parse_tokens("0.000001").unwrap(), 1);
        assert_eq!(parse_tokens(".5").unwrap(), 500_000);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_tokens("").is_err());
        assert!(parse_tokens(".").is_err());
        assert!(parse_tokens("abc").is_err());
        assert!(parse_tokens("1.2.3").is_err());
        assert!(parse_tokens("-1").is_err());
        // 7 decimal places would silently lose precision
        assert!(parse_tokens("0.1234567").is_err());
    }

    #[test]
    fn float_round_trip_for_fixed_payout() {
        let minor = 100_000;
        assert_eq!(from_tokens_f64(to_tokens_f64(minor)), minor);
        assert_eq!(from_tokens_f64(-0.5), 0);
    }

    #[test]
    fn serde_string_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "serde_string")]
            amount: u64,
        }

        let json = serde_json::to_string(&Wrapper { amount: 100_000 }).unwrap();
        assert_eq!(json, r#"{"amount":"100000"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, 100_000);

        let bad: serde_json::Result<Wrapper> = serde_json::from_str(r#"{"amount":"0.1x"}"#);
        assert!(bad.is_err());
    }
}
