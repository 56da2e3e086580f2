//! `CrowdplayServer` builder and accept loop, plus the handle emulator
//! runtimes use to talk back into the core.

use std::sync::Arc;

use crowdplay_emu::Emulator;
use crowdplay_protocol::{CommandKind, EmuId};
use crowdplay_transport::{
    Connection, Transport, WebSocketConnection, WebSocketTransport,
};

use crate::state::Shared;
use crate::{dispatcher, ingress, pinger, Command, CrowdplayError, ServerConfig};

// ---------------------------------------------------------------------------
// Emulator launcher seam
// ---------------------------------------------------------------------------

/// Spawns emulator runtimes in response to `add` commands.
///
/// The core knows nothing about cores or ROMs. A launcher starts the
/// runtime (its own thread or task, its choice), and the runtime calls
/// [`ServerHandle::register_session`] once it can accept input, then
/// [`ServerHandle::send_frame`] for every rendered frame.
pub trait EmulatorLauncher<C: Connection>: Send + Sync + 'static {
    fn launch(
        &self,
        server: ServerHandle<C>,
        id: EmuId,
        core_path: String,
        rom_path: String,
    );
}

/// The launcher used when no runtime is wired in: logs and drops.
pub struct NullLauncher;

impl<C: Connection> EmulatorLauncher<C> for NullLauncher {
    fn launch(
        &self,
        _server: ServerHandle<C>,
        id: EmuId,
        _core_path: String,
        _rom_path: String,
    ) {
        tracing::warn!(emu = %id, "no emulator runtime configured; session not started");
    }
}

// ---------------------------------------------------------------------------
// Server handle
// ---------------------------------------------------------------------------

/// A clonable handle into the running server, for emulator runtimes and
/// embedders.
#[derive(Clone)]
pub struct ServerHandle<C: Connection> {
    shared: Arc<Shared<C>>,
}

impl<C: Connection> ServerHandle<C> {
    pub(crate) fn from_shared(shared: Arc<Shared<C>>) -> Self {
        Self { shared }
    }

    /// Registers a runtime under its session id, making it visible to
    /// `connect`, `turn`, and `button`.
    pub async fn register_session(&self, id: EmuId, emulator: Arc<dyn Emulator>) {
        self.shared.emus.lock().await.add(id, emulator);
    }

    /// Compresses the session's current frame and fans it out to every
    /// viewer. Call once per rendered frame.
    pub async fn send_frame(&self, id: &EmuId) -> Result<(), CrowdplayError> {
        self.shared.send_frame(id).await
    }

    /// Begins the global shutdown sequence (idempotent).
    pub async fn shutdown(&self) {
        crate::state::shutdown(&self.shared).await;
    }

    /// `false` once shutdown has started; runtimes should wind down.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// A copy of the current configuration snapshot.
    pub async fn config(&self) -> ServerConfig {
        self.shared.config.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Crowdplay server.
///
/// # Example
///
/// ```rust,ignore
/// let server = CrowdplayServer::builder()
///     .bind("0.0.0.0:8080")
///     .config(ServerConfig::load_from(&path)?)
///     .launcher(MyRetroLauncher)
///     .bootstrap_session("emu1", "./core", "./rom")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct CrowdplayServerBuilder {
    bind_addr: String,
    config: ServerConfig,
    launcher: Box<dyn EmulatorLauncher<WebSocketConnection>>,
    bootstrap: Vec<(String, String, String)>,
}

impl CrowdplayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ServerConfig::default(),
            launcher: Box::new(NullLauncher),
            bootstrap: Vec::new(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration snapshot.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the emulator launcher.
    pub fn launcher(
        mut self,
        launcher: impl EmulatorLauncher<WebSocketConnection>,
    ) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Queues a session to be launched at startup, as an internal `add`
    /// command that bypasses the admin gate.
    pub fn bootstrap_session(
        mut self,
        id: &str,
        core_path: &str,
        rom_path: &str,
    ) -> Self {
        self.bootstrap.push((
            id.to_string(),
            core_path.to_string(),
            rom_path.to_string(),
        ));
        self
    }

    /// Binds the transport and assembles the server.
    pub async fn build(self) -> Result<CrowdplayServer, CrowdplayError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let shared = Shared::new(self.config, self.launcher);
        Ok(CrowdplayServer {
            transport,
            shared,
            bootstrap: self.bootstrap,
        })
    }
}

impl Default for CrowdplayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A running Crowdplay server.
///
/// Call [`run()`](Self::run) to start the dispatcher, the pinger, and
/// the accept loop. `run` returns after a graceful shutdown completes.
pub struct CrowdplayServer {
    transport: WebSocketTransport,
    shared: Arc<Shared<WebSocketConnection>>,
    bootstrap: Vec<(String, String, String)>,
}

impl CrowdplayServer {
    /// Creates a new builder.
    pub fn builder() -> CrowdplayServerBuilder {
        CrowdplayServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for emulator runtimes, embedders, and tests.
    pub fn handle(&self) -> ServerHandle<WebSocketConnection> {
        ServerHandle::from_shared(Arc::clone(&self.shared))
    }

    /// Runs the server until shutdown completes.
    pub async fn run(mut self) -> Result<(), CrowdplayError> {
        let dispatcher_task =
            tokio::spawn(dispatcher::run(Arc::clone(&self.shared)));
        *self.shared.dispatcher.lock().await = Some(dispatcher_task);

        tokio::spawn(pinger::run(
            Arc::clone(&self.shared),
            pinger::PING_INTERVAL,
        ));

        for (id, core, rom) in self.bootstrap.drain(..) {
            self.shared
                .queue
                .push(Command::internal(CommandKind::AddEmu, vec![id, core, rom]));
        }

        tracing::info!("crowdplay server running");

        let mut shutdown = self.shared.shutdown_watch();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(ingress::run_connection(shared, conn));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                }
            }
        }

        // Shutdown was initiated elsewhere (admin command or handle);
        // wait for the sequence to finish before returning.
        self.shared.wait_done().await;
        Ok(())
    }
}
