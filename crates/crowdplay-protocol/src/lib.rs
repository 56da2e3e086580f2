//! Wire protocol for Crowdplay.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Codec** ([`encode`], [`decode`], [`Field`]) — the line-oriented
//!   framed message format: UTF-8 fields joined by a field separator.
//! - **Command kinds** ([`CommandKind`]) — the table mapping the first
//!   field of a client message to a command.
//! - **Text rules** ([`is_printable_ascii`], [`escaped_len`]) — the
//!   validation predicates shared by chat and username handling.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the command
//! dispatcher. It doesn't know about connections or sessions — it only
//! knows how to turn payloads into field vectors and back.
//!
//! ```text
//! Transport (text frame) → Protocol (fields) → Dispatcher (policy)
//! ```
//!
//! Binary frames (JPEG video) bypass this crate entirely and travel as raw
//! WebSocket binary opcodes.

mod codec;
mod text;
mod types;

pub use codec::{decode, encode, Field, FIELD_SEPARATOR};
pub use text::{escaped_len, is_printable_ascii};
pub use types::{CommandKind, EmuId};
