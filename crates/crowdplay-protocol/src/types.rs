//! Identity and command-kind types shared across the server.

use std::fmt;

/// Identifier of an emulator session, as it appears on the wire.
///
/// The empty id is a sentinel meaning "not connected to any session" —
/// a user's `connected_emu` starts out empty, and broadcasts targeted at
/// the empty id reach exactly the users still in the lobby.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EmuId(String);

impl EmuId {
    /// Creates an id from any string-ish value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The empty sentinel id.
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the "no session" sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EmuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmuId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Every command the dispatcher knows about.
///
/// The first field of a decoded client payload selects a kind via
/// [`CommandKind::from_wire`]. Kinds the server recognizes but does not
/// act on (`RemoveEmu`, `StopEmu`, `Config`) still parse — the dispatcher
/// no-ops them — so the wire vocabulary stays stable while they are
/// unimplemented. Anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Enumerate the other users in the caller's session.
    List,
    /// Broadcast a chat line to every connected user.
    Chat,
    /// Set or change the caller's username.
    Username,
    /// Route a joypad update into the caller's session.
    Button,
    /// Join an emulator session as a viewer.
    Connect,
    /// Queue for exclusive input rights on the caller's session.
    Turn,
    /// Spawn a new emulator session (admin).
    AddEmu,
    /// Attempt the salted-hash admin challenge.
    Admin,
    /// Begin global shutdown (admin).
    Shutdown,
    /// Liveness reply to a server ping.
    Pong,
    /// Reserved.
    RemoveEmu,
    /// Reserved.
    StopEmu,
    /// Reserved.
    Config,
    /// Unrecognized verb.
    Unknown,
}

impl CommandKind {
    /// Maps the first field of a client message to a command kind.
    pub fn from_wire(verb: &str) -> Self {
        match verb {
            "list" => Self::List,
            "chat" => Self::Chat,
            "username" => Self::Username,
            "button" => Self::Button,
            "connect" => Self::Connect,
            "turn" => Self::Turn,
            "add" => Self::AddEmu,
            "admin" => Self::Admin,
            "shutdown" => Self::Shutdown,
            "pong" => Self::Pong,
            "remove" => Self::RemoveEmu,
            "stop" => Self::StopEmu,
            "config" => Self::Config,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Chat => "chat",
            Self::Username => "username",
            Self::Button => "button",
            Self::Connect => "connect",
            Self::Turn => "turn",
            Self::AddEmu => "add",
            Self::Admin => "admin",
            Self::Shutdown => "shutdown",
            Self::Pong => "pong",
            Self::RemoveEmu => "remove",
            Self::StopEmu => "stop",
            Self::Config => "config",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
