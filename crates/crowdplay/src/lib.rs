//! # Crowdplay
//!
//! A multi-user, multi-session interactive streaming server. Clients
//! connect over WebSocket to collectively watch and control long-running
//! emulator sessions: every viewer of a session receives its JPEG video
//! frames, and a turn arbiter grants one viewer at a time the right to
//! drive the session's joypad.
//!
//! ## Architecture
//!
//! ```text
//! transport ──→ ingress (per connection) ──→ command queue ──→ dispatcher
//!                                                                  │
//!                      registries · broadcast · turn arbiters ←────┘
//!
//! emulator runtime ──→ frame egress (JPEG) ──→ session viewers
//! pinger ──→ ping / reap silent clients
//! ```
//!
//! All policy lives in the dispatcher, which consumes one command at a
//! time — a single serialization point for every cross-user invariant.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crowdplay::prelude::*;
//!
//! # async fn run() -> Result<(), CrowdplayError> {
//! let server = CrowdplayServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod broadcast;
mod command;
mod config;
mod dispatcher;
mod error;
mod frames;
mod ingress;
mod pinger;
mod queue;
mod server;
mod state;
#[cfg(test)]
pub(crate) mod testutil;

pub use command::Command;
pub use config::{expand_tilde, ConfigError, ServerConfig};
pub use error::CrowdplayError;
pub use server::{
    CrowdplayServer, CrowdplayServerBuilder, EmulatorLauncher, NullLauncher,
    ServerHandle,
};

/// Re-exports everything needed to embed the server or implement an
/// emulator runtime against it.
pub mod prelude {
    // Meta-crate
    pub use crate::{
        Command, ConfigError, CrowdplayError, CrowdplayServer,
        CrowdplayServerBuilder, EmulatorLauncher, NullLauncher, ServerConfig,
        ServerHandle,
    };

    // Protocol types
    pub use crowdplay_protocol::{
        decode, encode, CommandKind, EmuId, Field,
    };

    // User types
    pub use crowdplay_user::{AdminChallenge, User, UserRegistry};

    // Session types
    pub use crowdplay_emu::{
        Emulator, EmuRegistry, Frame, FrameEncoder, InputDevice, TurnArbiter,
    };

    // Transport types
    pub use crowdplay_transport::{
        Connection, ConnectionId, Transport, WebSocketConnection,
        WebSocketTransport,
    };
}
