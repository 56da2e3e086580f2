//! Transport abstraction layer for Crowdplay.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the persistent bidirectional message channel clients connect through.
//! The core never touches sockets directly: ingress, broadcast, pinger, and
//! frame egress all speak to a [`Connection`], which keeps them testable
//! against in-memory implementations.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

/// Opaque identifier for one client channel.
///
/// The user registry keys its map by `ConnectionId`; commands carry it as
/// the weak reference back to their originating connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An inbound frame from a client.
///
/// Text frames carry protocol messages; binary frames from clients are
/// not part of the protocol and are ignored by ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Binary(Vec<u8>),
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single client channel: send, receive, close, and identify.
///
/// Implementations are cheaply cloneable handles onto shared channel
/// state, so the registry, the broadcast engine, and the per-connection
/// ingress task can all hold one.
///
/// The I/O methods are declared with explicit `impl Future + Send`
/// return types (rather than `async fn`) so generic server tasks that
/// call them can themselves be handed to `tokio::spawn`. Implementors
/// can still write plain `async fn`s.
pub trait Connection: Clone + Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a text frame (a protocol payload) to the remote peer.
    fn send_text(
        &self,
        payload: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends a binary frame (raw JPEG data) to the remote peer.
    fn send_binary(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Incoming>, Self::Error>> + Send;

    /// Closes the connection with a normal status and the given reason.
    fn close(
        &self,
        reason: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the peer's network address as recorded at accept time.
    fn remote_addr(&self) -> &str;
}
