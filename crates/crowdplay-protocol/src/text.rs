//! Text validation rules shared by chat and username handling.

use std::sync::OnceLock;

use regex::Regex;

/// Returns `true` iff every byte of `s` is printable ASCII (`' '..='~'`).
///
/// Chat messages and usernames must pass this check; anything outside the
/// range — control characters, newlines, tabs, non-ASCII UTF-8 — is
/// rejected by the dispatcher.
pub fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// Matches one client-side escape sequence: `\xHH`, `\uHHHH`, or
/// `\u{1HHHH}`, hex digits case-insensitive.
fn escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\\u\{1[0-9a-f]{4}\}|\\u[0-9a-f]{4}|\\x[0-9a-f]{2}")
            .expect("escape regex is valid")
    })
}

/// The length of `s` with each escape sequence counted as one character.
///
/// Clients send escapes literally (`A` is six bytes on the wire) but
/// render them as a single glyph, so the message-size limit measures the
/// rendered length:
///
/// ```
/// use crowdplay_protocol::escaped_len;
///
/// assert_eq!(escaped_len("hello\\u0041"), 6);
/// ```
pub fn escaped_len(s: &str) -> usize {
    let mut len = s.len();
    for m in escape_re().find_iter(s) {
        // Each whole escape collapses to a single counted character.
        len -= m.len() - 1;
    }
    len
}
