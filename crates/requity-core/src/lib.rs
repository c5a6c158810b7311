//! Core library for Requity: the data model shared by the attribution
//! engine and the CLI, fixed-point amount handling, the durable JSON state
//! store, hierarchical configuration, and tracing setup.

pub mod amount;
pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod store;
pub mod tracing_init;

pub use error::{Error, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as a Unix timestamp (seconds since epoch).
#[allow(clippy::cast_possible_wrap)]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
