//! Configuration resolution for Requity.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/requity/settings.json)
//! 3. Project config (.requity/settings.json)
//! 4. Environment variables (REQUITY_*, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Requity configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

/// Attribution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the persisted state file. Defaults per-OS when unset.
    pub state_path: Option<PathBuf>,
    /// Operator wallet funding payouts; also the placeholder owner for
    /// auto-registered domains.
    pub operator_address: String,
    /// Fixed reward per conversion, in PYUSD minor units.
    pub payout_amount_minor: u64,
    /// Auto-register unknown conversion domains instead of rejecting them.
    pub auto_register_unknown_domains: bool,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            operator_address: String::new(),
            payout_amount_minor: 100_000, // 0.1 PYUSD
            auto_register_unknown_domains: true,
            log_level: "info".to_string(),
        }
    }
}

/// Payments API (ledger) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL of the payments service.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3001".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Domain ownership verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Per-fetch timeout for verification requests.
    pub fetch_timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { fetch_timeout_secs: 10 }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".requity").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default persisted state file path.
pub fn default_state_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("state.json"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".requity"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/requity"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("requity"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.engine.state_path.is_some() {
        base.engine.state_path = overlay.engine.state_path;
    }
    if !overlay.engine.operator_address.is_empty() {
        base.engine.operator_address = overlay.engine.operator_address;
    }
    base.engine.payout_amount_minor = overlay.engine.payout_amount_minor;
    base.engine.auto_register_unknown_domains = overlay.engine.auto_register_unknown_domains;
    base.engine.log_level = overlay.engine.log_level;

    base.ledger = overlay.ledger;
    base.verifier = overlay.verifier;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("REQUITY_STATE_PATH") {
        config.engine.state_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("REQUITY_OPERATOR_ADDRESS") {
        config.engine.operator_address = val;
    }
    if let Ok(val) = std::env::var("REQUITY_PAYOUT_AMOUNT") {
        if let Ok(n) = val.parse() {
            config.engine.payout_amount_minor = n;
        }
    }
    if let Ok(val) = std::env::var("REQUITY_PAYMENTS_URL") {
        config.ledger.api_base_url = val;
    }
    if let Ok(val) = std::env::var("REQUITY_LOG_LEVEL") {
        config.engine.log_level = val;
    }
}
