//! In-memory doubles for exercising the core without sockets.

use std::sync::{Arc, Mutex};

use crowdplay_emu::{Emulator, Frame, InputDevice};
use crowdplay_protocol::EmuId;
use crowdplay_transport::{Connection, ConnectionId, Incoming, TransportError};
use uuid::Uuid;

use crate::server::{EmulatorLauncher, NullLauncher, ServerHandle};
use crate::state::Shared;
use crate::ServerConfig;

// ---------------------------------------------------------------------------
// Mock connection
// ---------------------------------------------------------------------------

/// What a mock connection has transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Binary(Vec<u8>),
}

/// A [`Connection`] that records everything sent through it.
#[derive(Clone)]
pub struct MockConnection {
    id: ConnectionId,
    sent: Arc<Mutex<Vec<Sent>>>,
    closed: Arc<Mutex<Option<String>>>,
}

impl MockConnection {
    pub fn new(id: u64) -> Self {
        Self {
            id: ConnectionId::new(id),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(None)),
        }
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Just the text payloads, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::Binary(_) => None,
            })
            .collect()
    }

    /// The close reason, if the server closed this connection.
    pub fn close_reason(&self) -> Option<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl Connection for MockConnection {
    type Error = TransportError;

    async fn send_text(&self, payload: &str) -> Result<(), Self::Error> {
        self.sent.lock().unwrap().push(Sent::Text(payload.to_owned()));
        Ok(())
    }

    async fn send_binary(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.lock().unwrap().push(Sent::Binary(data.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Incoming>, Self::Error> {
        // Dispatcher tests push commands directly; nothing arrives here.
        std::future::pending::<()>().await;
        unreachable!()
    }

    async fn close(&self, reason: &str) -> Result<(), Self::Error> {
        *self.closed.lock().unwrap() = Some(reason.to_owned());
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> &str {
        "127.0.0.1"
    }
}

// ---------------------------------------------------------------------------
// Stub emulator and launcher
// ---------------------------------------------------------------------------

/// An [`Emulator`] that records inputs and serves a configurable frame.
#[derive(Default)]
pub struct StubEmulator {
    pub inputs: Mutex<Vec<(InputDevice, i16, i16)>>,
    pub frame: Mutex<Frame>,
    pub joined: Mutex<Vec<Uuid>>,
    pub left: Mutex<Vec<Uuid>>,
}

impl StubEmulator {
    pub fn with_frame(frame: Frame) -> Self {
        Self {
            frame: Mutex::new(frame),
            ..Self::default()
        }
    }

    pub fn inputs(&self) -> Vec<(InputDevice, i16, i16)> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Emulator for StubEmulator {
    fn set_input(&self, device: InputDevice, id: i16, value: i16) {
        self.inputs.lock().unwrap().push((device, id, value));
    }

    fn frame(&self) -> Frame {
        self.frame.lock().unwrap().clone()
    }

    fn user_connected(&self, user: Uuid) {
        self.joined.lock().unwrap().push(user);
    }

    fn user_disconnected(&self, user: Uuid) {
        self.left.lock().unwrap().push(user);
    }
}

/// A launcher that records what it was asked to launch.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    pub launched: Arc<Mutex<Vec<(EmuId, String, String)>>>,
}

impl EmulatorLauncher<MockConnection> for RecordingLauncher {
    fn launch(
        &self,
        _server: ServerHandle<MockConnection>,
        id: EmuId,
        core_path: String,
        rom_path: String,
    ) {
        self.launched.lock().unwrap().push((id, core_path, rom_path));
    }
}

// ---------------------------------------------------------------------------
// Shared-state helpers
// ---------------------------------------------------------------------------

/// Shared state with defaults and no launcher.
pub fn test_shared() -> Arc<Shared<MockConnection>> {
    Shared::new(ServerConfig::default(), Box::new(NullLauncher))
}

/// Shared state with a recording launcher.
pub fn test_shared_with_launcher(
    launcher: RecordingLauncher,
) -> Arc<Shared<MockConnection>> {
    Shared::new(ServerConfig::default(), Box::new(launcher))
}

/// Registers a mock connection and returns its pieces. `name` may be
/// empty for a just-joined user.
pub async fn add_user(
    shared: &Arc<Shared<MockConnection>>,
    id: u64,
    name: &str,
) -> (ConnectionId, MockConnection, Uuid) {
    let conn = MockConnection::new(id);
    let conn_id = conn.id();
    let uuid = {
        let mut users = shared.users.write().await;
        let uuid = users.on_connect(conn_id, conn.clone(), "127.0.0.1");
        if !name.is_empty() {
            users.get_mut(conn_id).unwrap().user.username = name.to_owned();
        }
        uuid
    };
    (conn_id, conn, uuid)
}

/// Registers a stub emulator session under `id`.
pub async fn add_session(
    shared: &Arc<Shared<MockConnection>>,
    id: &str,
    emulator: Arc<StubEmulator>,
) -> Arc<crowdplay_emu::EmuEntry> {
    shared.emus.lock().await.add(EmuId::new(id), emulator)
}

/// Builds a client command the way ingress would: snapshotting the
/// user's current session membership.
pub async fn client_cmd(
    shared: &Arc<Shared<MockConnection>>,
    conn_id: ConnectionId,
    kind: crowdplay_protocol::CommandKind,
    params: &[&str],
) -> crate::Command {
    let users = shared.users.read().await;
    let entry = users.get(conn_id).expect("user must exist");
    crate::Command {
        kind,
        params: params.iter().map(|p| p.to_string()).collect(),
        conn: conn_id,
        emu: entry.user.connected_emu.clone(),
        user: Some(entry.user.uuid()),
    }
}
