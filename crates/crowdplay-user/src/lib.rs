//! User tracking for Crowdplay.
//!
//! This crate handles everything the server knows about a connected
//! client:
//!
//! 1. **Identity** — the [`User`] record: uuid, address, username, and
//!    the mutable per-user flags (session membership, turn state, admin).
//! 2. **Registry** — [`UserRegistry`]: the canonical handle → user map,
//!    plus username uniqueness and guest-name assignment.
//! 3. **Admin challenge** — [`AdminChallenge`]: the salted-hash gate for
//!    the `admin` command.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)   ← mutates users while executing commands
//!     ↕
//! User layer (this crate)  ← owns user records, keyed by connection
//!     ↕
//! Transport (below)    ← provides ConnectionId and the send channel
//! ```
//!
//! # Concurrency note
//!
//! `UserRegistry` is NOT thread-safe by itself — it is a plain `HashMap`
//! owned behind a single `RwLock` at the server level. Writers are the
//! connect/disconnect paths and the dispatcher; the broadcast engine and
//! pinger read through the same lock.

mod auth;
mod error;
mod registry;
mod user;

pub use auth::{digest as admin_digest, AdminChallenge};
pub use error::NameRejection;
pub use registry::{UserEntry, UserRegistry};
pub use user::{validate_name_format, User, MAX_ADMIN_ATTEMPTS};
