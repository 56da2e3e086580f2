//! Shared server state and the lifecycle operations that cut across
//! subsystems: turn granting, disconnect cleanup, and shutdown.
//!
//! The cross-cutting operations are free functions over `Arc<Shared>`
//! (they spawn tasks that need their own handle on the state); simple
//! accessors live on the struct.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crowdplay_emu::{EmuEntry, EmuRegistry, TurnGrant};
use crowdplay_protocol::{encode, EmuId};
use crowdplay_transport::{Connection, ConnectionId};
use crowdplay_user::UserRegistry;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::queue::CommandQueue;
use crate::server::EmulatorLauncher;
use crate::{Command, ServerConfig};

/// Everything the server's tasks share.
///
/// Lock discipline: no path holds more than one of `users`/`emus` at a
/// time, and sends always happen after guards are dropped.
pub(crate) struct Shared<C: Connection> {
    /// Handle → user map. Writers: connect, disconnect, dispatcher,
    /// pinger. Readers: broadcast iteration, lookups.
    pub users: RwLock<UserRegistry<C>>,
    /// Id → running session, exclusive-locked.
    pub emus: Mutex<EmuRegistry>,
    /// The typed configuration snapshot.
    pub config: RwLock<ServerConfig>,
    /// Ingress → dispatcher work queue.
    pub queue: CommandQueue,
    /// Spawns emulator runtimes on `add`.
    pub launcher: Box<dyn EmulatorLauncher<C>>,
    /// Cleared first thing during shutdown; the dispatcher exits when it
    /// observes `false`.
    pub running: AtomicBool,
    /// One-shot latch so the shutdown sequence runs at most once.
    shutting_down: AtomicBool,
    /// Flipped to `true` to stop the accept loop and the pinger. A
    /// `watch` rather than a `Notify` so a signal sent before a task
    /// parks is still observed.
    pub shutdown_started: watch::Sender<bool>,
    /// The dispatcher task, joined during shutdown.
    pub dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Flipped to `true` when the shutdown sequence has fully finished.
    done: watch::Sender<bool>,
}

impl<C: Connection> Shared<C> {
    pub fn new(config: ServerConfig, launcher: Box<dyn EmulatorLauncher<C>>) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        let (shutdown_started, _) = watch::channel(false);
        Arc::new(Self {
            users: RwLock::new(UserRegistry::new()),
            emus: Mutex::new(EmuRegistry::new()),
            config: RwLock::new(config),
            queue: CommandQueue::new(),
            launcher,
            running: AtomicBool::new(true),
            shutting_down: AtomicBool::new(false),
            shutdown_started,
            dispatcher: Mutex::new(None),
            done,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A receiver on the shutdown flag, for loops that must stop.
    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown_started.subscribe()
    }

    /// Waits until the shutdown sequence has fully finished.
    pub async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Turn lifecycle
// ---------------------------------------------------------------------------

/// Applies a grant from a session's arbiter: flips the holder's flags
/// and schedules the expiry timer. If the granted uuid no longer
/// resolves (disconnected while queued), the arbiter rotates and the
/// next candidate is tried.
pub(crate) fn grant_turn<'a, C: Connection>(
    shared: &'a Arc<Shared<C>>,
    entry: &'a Arc<EmuEntry>,
    grant: TurnGrant,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut grant = grant;
        loop {
            let applied = {
                let mut users = shared.users.write().await;
                match users.find_by_uuid_mut(grant.holder) {
                    Some((_, e)) => {
                        e.user.has_turn = true;
                        e.user.requested_turn = false;
                        true
                    }
                    None => false,
                }
            };

            if applied {
                tracing::debug!(emu = %entry.id, holder = %grant.holder, "turn granted");
                let turn_length = shared.config.read().await.turn_length;
                let shared = Arc::clone(shared);
                let emu_id = entry.id.clone();
                let generation = grant.generation;
                tokio::spawn(async move {
                    tokio::time::sleep(turn_length).await;
                    expire_turn(&shared, &emu_id, generation).await;
                });
                return;
            }

            match entry.turns.remove(grant.holder).next {
                Some(next) => grant = next,
                None => return,
            }
        }
    })
}

/// Ends the turn identified by `generation` (timer path) and promotes
/// the next queued user. Stale generations no-op.
pub(crate) async fn expire_turn<C: Connection>(
    shared: &Arc<Shared<C>>,
    emu_id: &EmuId,
    generation: u64,
) {
    let entry = shared.emus.lock().await.lookup(emu_id);
    let Some(entry) = entry else { return };
    let Some((released, next)) = entry.turns.expire(generation) else {
        return;
    };

    {
        let mut users = shared.users.write().await;
        if let Some((_, e)) = users.find_by_uuid_mut(released) {
            e.user.has_turn = false;
        }
    }
    tracing::debug!(emu = %emu_id, holder = %released, "turn ended");

    if let Some(next) = next {
        grant_turn(shared, &entry, next).await;
    }
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

/// Tears down one connection: session callbacks, `leave` broadcast,
/// turn handoff, registry erase. Called by the ingress task when the
/// connection's receive side ends, however it ended.
pub(crate) async fn handle_disconnect<C: Connection>(
    shared: &Arc<Shared<C>>,
    conn_id: ConnectionId,
) {
    let info = {
        let users = shared.users.read().await;
        users.get(conn_id).map(|e| {
            (
                e.user.uuid(),
                e.user.username.clone(),
                e.user.connected_emu.clone(),
            )
        })
    };
    let Some((uuid, username, emu_id)) = info else {
        tracing::debug!(%conn_id, "disconnect for unknown connection");
        return;
    };

    if !emu_id.is_empty() {
        let entry = shared.emus.lock().await.lookup(&emu_id);
        if let Some(entry) = entry {
            entry.emulator.user_disconnected(uuid);
            let removal = entry.turns.remove(uuid);
            if let Some(next) = removal.next {
                grant_turn(shared, &entry, next).await;
            }
        }

        shared
            .broadcast_session(&emu_id, &encode(&["leave".into(), (&username).into()]))
            .await;
        tracing::info!(%uuid, username = %username, emu = %emu_id, "left session");
    }

    shared.users.write().await.on_disconnect(conn_id);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// The global shutdown sequence. Idempotent: only the first caller runs
/// it, later calls return immediately.
///
/// Order matters: stop the dispatcher loop flag first, then replace the
/// queue contents with the wake-up sentinel, stop accepting and pinging,
/// join the dispatcher, and finally close every client.
pub(crate) async fn shutdown<C: Connection>(shared: &Arc<Shared<C>>) {
    if shared.shutting_down.swap(true, Ordering::SeqCst) {
        return;
    }
    tracing::info!("shutdown initiated");

    shared.running.store(false, Ordering::SeqCst);
    shared.queue.drain_and_plant(Command::shutdown_sentinel());
    let _ = shared.shutdown_started.send(true);

    if let Some(handle) = shared.dispatcher.lock().await.take() {
        tracing::debug!("waiting for dispatcher to stop");
        let _ = handle.await;
    }

    let conns: Vec<C> = {
        let users = shared.users.read().await;
        users.iter().map(|(_, e)| e.conn.clone()).collect()
    };
    tracing::info!(connections = conns.len(), "closing every connection");
    for conn in conns {
        let _ = conn.close("Closing").await;
    }

    let _ = shared.done.send(true);
    tracing::info!("shutdown complete");
}
