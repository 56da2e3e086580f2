//! Error types for the user layer.

/// Why a requested username was rejected.
///
/// Rejections are not wire errors — the dispatcher answers them with the
/// per-command negative acknowledgment (or a guest name for a just-joined
/// user) and logs the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameRejection {
    /// Outside the configured `[min, max]` length bounds.
    #[error("length out of bounds")]
    Length,

    /// Leading/trailing space, non-printable ASCII, or a double space.
    #[error("invalid content")]
    Content,

    /// Another live user already holds this name.
    #[error("already taken")]
    Taken,

    /// Same as the current name (and the user is not just-joined).
    #[error("unchanged")]
    Unchanged,
}
