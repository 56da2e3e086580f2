//! The admin challenge: a salted-hash gate for privileged commands.
//!
//! The server never stores the admin password. Configuration carries a
//! salt and the hex SHA-256 digest of `password ‖ salt`; a client earns
//! `has_admin` by sending an attempt that digests to the same value.
//! Attempts are capped per user — after three failures the dispatcher
//! drops further `admin` commands outright.

use sha2::{Digest, Sha256};

/// The expected digest plus its salt, snapshotted from configuration.
#[derive(Debug, Clone)]
pub struct AdminChallenge {
    salt: String,
    expected: String,
}

impl AdminChallenge {
    /// Builds a challenge from the configured salt and hex digest.
    pub fn new(salt: impl Into<String>, expected_hash: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            expected: expected_hash.into(),
        }
    }

    /// Returns `true` iff `digest(attempt ‖ salt)` matches the
    /// configured hash. Hex case does not matter.
    pub fn verify(&self, attempt: &str) -> bool {
        digest(attempt, &self.salt) == self.expected.to_ascii_lowercase()
    }
}

/// Lowercase hex SHA-256 of `attempt ‖ salt`.
///
/// Exposed so operators (and tests) can derive the value to put in
/// `serverConfig.adminHash`.
pub fn digest(attempt: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(attempt.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}
