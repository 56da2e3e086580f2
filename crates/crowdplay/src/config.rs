//! Server configuration: a weakly-typed JSON tree snapshotted into a
//! strongly-typed struct.
//!
//! Every key is optional. A missing or wrongly-typed value falls back to
//! the built-in default with a logged warning — a bad config file
//! degrades the server, it never stops it. The dispatcher reads the
//! snapshot under a shared lock (the `config` admin command is reserved
//! for runtime updates).
//!
//! ```json
//! {
//!     "serverConfig": {
//!         "maxMessageSize": 255,
//!         "maxUsernameLength": 16,
//!         "minUsernameLength": 3,
//!         "jpegQuality": 80,
//!         "salt": "...",
//!         "adminHash": "...",
//!         "clientTimeout": 30,
//!         "turnLength": 10
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crowdplay_user::AdminChallenge;
use serde_json::Value;

/// Errors reading the configuration file itself.
///
/// Key-level problems are not errors — they warn and default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The typed configuration snapshot.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum escape-normalized chat message length.
    pub max_message_size: u64,
    /// Username length bounds, inclusive.
    pub max_username_length: u64,
    pub min_username_length: u64,
    /// JPEG quality for frame egress, 1–100.
    pub jpeg_quality: u8,
    /// Salt appended to admin challenge attempts before hashing.
    pub salt: String,
    /// Lowercase hex SHA-256 digest of `password ‖ salt`. The empty
    /// default can never match a digest, so admin stays unreachable
    /// until explicitly configured.
    pub admin_hash: String,
    /// Silence threshold before the pinger disconnects a client.
    pub client_timeout: Duration,
    /// How long one turn lasts before the arbiter rotates.
    pub turn_length: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 255,
            max_username_length: 16,
            min_username_length: 3,
            jpeg_quality: 80,
            salt: String::new(),
            admin_hash: String::new(),
            client_timeout: Duration::from_secs(30),
            turn_length: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Reads and snapshots a configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text)?;
        Ok(Self::from_value(&root))
    }

    /// Builds a snapshot from a parsed JSON tree, defaulting every
    /// missing or mistyped key.
    pub fn from_value(root: &Value) -> Self {
        let defaults = Self::default();
        let section = &root["serverConfig"];

        Self {
            max_message_size: uint_key(section, "maxMessageSize", defaults.max_message_size),
            max_username_length: uint_key(
                section,
                "maxUsernameLength",
                defaults.max_username_length,
            ),
            min_username_length: uint_key(
                section,
                "minUsernameLength",
                defaults.min_username_length,
            ),
            jpeg_quality: quality_key(section, defaults.jpeg_quality),
            salt: string_key(section, "salt", &defaults.salt),
            admin_hash: string_key(section, "adminHash", &defaults.admin_hash),
            client_timeout: Duration::from_secs(uint_key(
                section,
                "clientTimeout",
                defaults.client_timeout.as_secs(),
            )),
            turn_length: Duration::from_secs(uint_key(
                section,
                "turnLength",
                defaults.turn_length.as_secs(),
            )),
        }
    }

    /// The admin challenge for this snapshot.
    pub fn admin_challenge(&self) -> AdminChallenge {
        AdminChallenge::new(self.salt.clone(), self.admin_hash.clone())
    }
}

fn uint_key(section: &Value, key: &str, default: u64) -> u64 {
    match section.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => value.as_u64().unwrap_or_else(|| {
            tracing::warn!(key, %value, "expected unsigned integer, using default");
            default
        }),
    }
}

fn string_key(section: &Value, key: &str, default: &str) -> String {
    match section.get(key) {
        None | Some(Value::Null) => default.to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(value) => {
            tracing::warn!(key, %value, "expected string, using default");
            default.to_owned()
        }
    }
}

/// `jpegQuality` must be an integer in 1..=100; anything else defaults.
fn quality_key(section: &Value, default: u8) -> u8 {
    match section.get("jpegQuality") {
        None | Some(Value::Null) => default,
        Some(value) => match value.as_i64() {
            Some(q @ 1..=100) => q as u8,
            _ => {
                tracing::warn!(%value, "jpegQuality must be an integer in 1..=100, using default");
                default
            }
        },
    }
}

/// Expands a leading `~` using `$HOME`.
///
/// If `HOME` is unset the expansion falls back to the current directory,
/// with a warning.
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(format!("{home}{rest}")),
        Err(_) => {
            tracing::warn!("path begins with '~' but HOME is unset, using '.'");
            PathBuf::from(format!(".{rest}"))
        }
    }
}
