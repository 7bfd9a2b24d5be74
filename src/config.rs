//! Ledger configuration loaded from environment variables.
//!
//! Every setting has a default matching the browser demo, so nothing needs to
//! be set for local use.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Simulated network latency per kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    /// Most calls.
    pub standard: Duration,
    pub mark_all_read: Duration,
    pub mark_one_read: Duration,
    pub chat: Duration,
}

impl Latency {
    pub const fn none() -> Self {
        Self {
            standard: Duration::ZERO,
            mark_all_read: Duration::ZERO,
            mark_one_read: Duration::ZERO,
            chat: Duration::ZERO,
        }
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            standard: Duration::from_millis(500),
            mark_all_read: Duration::from_millis(200),
            mark_one_read: Duration::from_millis(100),
            chat: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Directory holding the file-backed storage.
    /// Env: `PULSE_DATA_DIR`
    /// Default: `./pulse-data`
    pub data_dir: PathBuf,

    /// Storage key of the serialized store.
    /// Env: `PULSE_DB_KEY`
    /// Default: `cryptoPulseDB`
    pub db_key: String,

    /// Storage key of the client's session token.
    pub token_key: String,

    /// Prefix of the per-uid avatar keys.
    pub photo_key_prefix: String,

    /// Account notified of new deposits and KYC submissions.
    /// Env: `PULSE_ADMIN_EMAIL`
    /// Default: `admin@cryptopulse.com`
    pub admin_email: String,

    /// Env: `PULSE_LATENCY_MS` sets the standard delay; `0` disables all delays.
    pub latency: Latency,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./pulse-data"),
            db_key: "cryptoPulseDB".to_string(),
            token_key: "cryptoPulseAuthToken".to_string(),
            photo_key_prefix: "cryptoPulsePhoto-".to_string(),
            admin_email: "admin@cryptopulse.com".to_string(),
            latency: Latency::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("PULSE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(key) = lookup("PULSE_DB_KEY") {
            if key.trim().is_empty() {
                warn!("Empty PULSE_DB_KEY, using default");
            } else {
                config.db_key = key;
            }
        }

        if let Some(email) = lookup("PULSE_ADMIN_EMAIL") {
            config.admin_email = email;
        }

        if let Some(value) = lookup("PULSE_LATENCY_MS") {
            match value.trim().parse::<u64>() {
                Ok(0) => config.latency = Latency::none(),
                Ok(ms) => config.latency.standard = Duration::from_millis(ms),
                Err(e) => {
                    warn!(value = %value, error = %e, "Invalid PULSE_LATENCY_MS, using default");
                }
            }
        }

        config
    }

    pub fn photo_key(&self, uid: &crate::model::Uid) -> String {
        format!("{}{uid}", self.photo_key_prefix)
    }
}
