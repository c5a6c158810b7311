//! Durable JSON store for engine state.
//!
//! One file holds the website registry, the conversion log, and the payout
//! escrow. Loading tolerates a missing or corrupt file by starting from
//! empty state; the engine must never fail to start because of a bad state
//! file. Saving goes through a temp file in the target directory followed
//! by a rename so a crash mid-write cannot leave a truncated file behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{ConversionEvent, PendingPayout, WebsiteRegistration};

/// Complete persisted engine state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// Map from website id to registration.
    #[serde(default)]
    pub websites: HashMap<String, WebsiteRegistration>,
    /// Append-only conversion log.
    #[serde(default)]
    pub conversions: Vec<ConversionEvent>,
    /// Escrowed payouts, claimed in place.
    #[serde(default)]
    pub pending_payouts: Vec<PendingPayout>,
}

impl StoreState {
    /// Load state from a JSON file.
    ///
    /// A missing file yields empty state. A corrupt file is logged and also
    /// yields empty state rather than crashing the process.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable state file, starting empty");
                return Self::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt state file, starting empty");
                Self::default()
            }
        }
    }

    /// Save state to a JSON file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path)
            .map_err(|e| Error::Store(format!("failed to replace {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayoutStatus;

    fn sample_state() -> StoreState {
        let mut state = StoreState::default();
        state.websites.insert(
            "w1".into(),
            WebsiteRegistration {
                website_id: "w1".into(),
                domain: "example.com".into(),
                owner: "wallet".into(),
                verification_token: "tok".into(),
                is_verified: true,
                registration_timestamp: 1_700_000_000,
                total_conversions: 1,
                total_earnings: 100_000,
            },
        );
        state.pending_payouts.push(PendingPayout {
            website_id: "w1".into(),
            domain: "example.com".into(),
            conversion_id: "c1".into(),
            amount: 100_000,
            timestamp: 1_700_000_100,
            source_url: "https://example.com/p".into(),
            status: PayoutStatus::Pending,
        });
        state
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let state = StoreState::load(Path::new("/nonexistent/requity/state.json"));
        assert!(state.websites.is_empty());
        assert!(state.pending_payouts.is_empty());
    }

    #[test]
    fn load_corrupt_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not valid json !!!").unwrap();

        let state = StoreState::load(&path);
        assert!(state.websites.is_empty());
        assert!(state.conversions.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        sample_state().save(&path).unwrap();
        let loaded = StoreState::load(&path);
        assert_eq!(loaded.websites.len(), 1);
        assert_eq!(loaded.websites["w1"].total_earnings, 100_000);
        assert_eq!(loaded.pending_payouts.len(), 1);
        assert_eq!(loaded.pending_payouts[0].status, PayoutStatus::Pending);
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        sample_state().save(&path).unwrap();
        sample_state().save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn amounts_persist_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        sample_state().save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""totalEarnings": "100000""#));
        assert!(raw.contains(r#""pendingPayouts""#));
    }
}
