//! Unified error type for the Crowdplay server.

use crowdplay_emu::EmuError;
use crowdplay_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Wire-facing failures never surface here — malformed client input is
/// silently dropped or negatively acknowledged per command. This type is
/// for operator-facing failures: binding the listener, reading
/// configuration, encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum CrowdplayError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A session-level error (unknown session, frame encoding).
    #[error(transparent)]
    Emu(#[from] EmuError),

    /// A configuration-file error (I/O, JSON syntax).
    #[error(transparent)]
    Config(#[from] ConfigError),
}
