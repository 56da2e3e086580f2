//! Error types for the emulator session layer.

use crowdplay_protocol::EmuId;

/// Errors that can occur in session lookup and frame encoding.
#[derive(Debug, thiserror::Error)]
pub enum EmuError {
    /// No active session with this id.
    #[error("no session with id '{0}'")]
    NotFound(EmuId),

    /// The frame's pixel buffer does not match its stated dimensions.
    #[error("frame geometry mismatch: expected {expected} bytes, got {actual}")]
    FrameGeometry { expected: usize, actual: usize },

    /// JPEG compression failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
