//! The field codec: payload string ⇄ ordered field vector.
//!
//! A message is a sequence of UTF-8 fields joined by [`FIELD_SEPARATOR`].
//! The separator is the ASCII unit separator (U+001F), which lies outside
//! the printable range — so any sequence of printable-ASCII fields
//! round-trips exactly, with no escaping:
//!
//! ```
//! use crowdplay_protocol::{decode, encode, Field};
//!
//! let payload = encode(&["chat".into(), "alice".into(), "hi, all".into()]);
//! assert_eq!(decode(&payload), vec!["chat", "alice", "hi, all"]);
//! ```

use std::fmt::Write as _;

/// Separates fields inside a text payload.
///
/// U+001F (unit separator) is non-printable, so it can never occur inside
/// a valid chat message or username — the dispatcher rejects those before
/// they are ever echoed back out.
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// One typed field of an outgoing message.
///
/// Server replies mix strings with booleans (`connect`, `admin`) and
/// unsigned integers (`emuinfo`). Each renders to its canonical text form:
/// `true`/`false` for booleans, base-10 for integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Str(&'a str),
    Bool(bool),
    Uint(u64),
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(value: &'a str) -> Self {
        Self::Str(value)
    }
}

impl<'a> From<&'a String> for Field<'a> {
    fn from(value: &'a String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Field<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for Field<'_> {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

/// Encodes a command name plus parameters into a single text payload.
///
/// The first field is conventionally the command name, but the codec does
/// not care — it joins whatever it is given.
pub fn encode(fields: &[Field<'_>]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        match field {
            Field::Str(s) => out.push_str(s),
            Field::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            // write! into a String cannot fail.
            Field::Uint(n) => write!(out, "{n}").unwrap(),
        }
    }
    out
}

/// Decodes a payload into its ordered field sequence.
///
/// An empty payload decodes to the empty vector, which the dispatcher
/// treats as a no-op. There is no malformed case beyond emptiness: the
/// transport already guarantees valid UTF-8 for text frames, and any
/// split result is a legal field vector.
pub fn decode(payload: &str) -> Vec<String> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload
        .split(FIELD_SEPARATOR)
        .map(str::to_owned)
        .collect()
}
