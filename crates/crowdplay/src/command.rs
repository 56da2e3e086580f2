//! The queued command: one decoded client message plus its origin.

use crowdplay_protocol::{CommandKind, EmuId};
use crowdplay_transport::ConnectionId;
use uuid::Uuid;

/// One unit of dispatcher work.
///
/// Built by ingress from a decoded payload. `emu` is a snapshot of the
/// originator's `connected_emu` at enqueue time; `user` is a weak
/// reference (the uuid) that the dispatcher re-resolves against the
/// registry — a dead reference means the user disconnected while the
/// command was queued, and the command is dropped.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    /// Everything after the verb field.
    pub params: Vec<String>,
    /// The originating connection.
    pub conn: ConnectionId,
    /// Snapshot of the originator's session membership.
    pub emu: EmuId,
    /// Weak reference to the originating user; `None` for commands the
    /// server enqueues itself (bootstrap, shutdown sentinel).
    pub user: Option<Uuid>,
}

impl Command {
    /// A server-internal command with no originating client.
    ///
    /// Internal commands carry no user and therefore bypass per-user
    /// gates (there is no admin flag to check on the bootstrap path).
    pub fn internal(kind: CommandKind, params: Vec<String>) -> Self {
        Self {
            kind,
            params,
            conn: ConnectionId::new(0),
            emu: EmuId::none(),
            user: None,
        }
    }

    /// The terminal wake-up sentinel planted during shutdown.
    pub fn shutdown_sentinel() -> Self {
        Self::internal(CommandKind::Shutdown, Vec::new())
    }
}
