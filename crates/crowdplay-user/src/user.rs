//! The per-connection user record.

use std::time::Instant;

use crowdplay_protocol::{is_printable_ascii, EmuId};
use uuid::Uuid;

use crate::NameRejection;

/// Admin challenge attempts allowed before further `admin` commands are
/// dropped for the lifetime of the connection.
pub const MAX_ADMIN_ATTEMPTS: u8 = 3;

/// One connected client.
///
/// Created on connect, destroyed on disconnect; a user never outlives its
/// connection. The immutable identity (uuid, address) is fixed at
/// creation; everything else is mutated by the dispatcher (and
/// `last_pong` by the pinger) under the registry lock.
#[derive(Debug)]
pub struct User {
    uuid: Uuid,
    remote_addr: String,

    /// Empty until the first accepted `username` command (or guest
    /// assignment). Non-empty usernames are unique across live users.
    pub username: String,

    /// The session this user is viewing, or the empty sentinel.
    pub connected_emu: EmuId,

    /// Set when the admin challenge succeeds.
    pub has_admin: bool,

    /// Failed admin challenges so far, capped at [`MAX_ADMIN_ATTEMPTS`].
    pub admin_attempts: u8,

    /// True iff this user is the current input holder of `connected_emu`.
    pub has_turn: bool,

    /// True iff this user is queued in that session's turn arbiter.
    pub requested_turn: bool,

    /// Last time a `pong` arrived; the pinger reaps users whose silence
    /// exceeds the configured timeout.
    pub last_pong: Instant,
}

impl User {
    /// Creates a fresh user with an empty username.
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            remote_addr: remote_addr.into(),
            username: String::new(),
            connected_emu: EmuId::none(),
            has_admin: false,
            admin_attempts: 0,
            has_turn: false,
            requested_turn: false,
            last_pong: Instant::now(),
        }
    }

    /// The user's globally unique id, assigned at connect.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The originating network address.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Records a liveness reply.
    pub fn touch_pong(&mut self) {
        self.last_pong = Instant::now();
    }

    /// Whether this user has been silent longer than `timeout`.
    pub fn timed_out(&self, timeout: std::time::Duration) -> bool {
        self.last_pong.elapsed() > timeout
    }

    /// One more failed admin challenge, saturating at the cap.
    pub fn record_admin_failure(&mut self) {
        self.admin_attempts = (self.admin_attempts + 1).min(MAX_ADMIN_ATTEMPTS);
    }

    /// Whether the admin challenge is still open to this user.
    pub fn admin_attempts_left(&self) -> bool {
        self.admin_attempts < MAX_ADMIN_ATTEMPTS
    }
}

/// Checks a requested username against the format rules.
///
/// Rules, in rejection order:
/// 1. Length within `[min_len, max_len]` (bytes).
/// 2. No leading or trailing space, printable ASCII only, and no double
///    space anywhere inside.
///
/// Uniqueness is the registry's concern
/// ([`UserRegistry::username_taken`](crate::UserRegistry::username_taken));
/// the "unchanged name" rule is the dispatcher's.
pub fn validate_name_format(
    name: &str,
    min_len: u64,
    max_len: u64,
) -> Result<(), NameRejection> {
    let len = name.len() as u64;
    if len < min_len || len > max_len {
        return Err(NameRejection::Length);
    }
    if name.starts_with(' ')
        || name.ends_with(' ')
        || !is_printable_ascii(name)
        || name.contains("  ")
    {
        return Err(NameRejection::Content);
    }
    Ok(())
}
