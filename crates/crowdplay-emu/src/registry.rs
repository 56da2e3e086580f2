//! The session registry: id → running emulator session.

use std::collections::HashMap;
use std::sync::Arc;

use crowdplay_protocol::EmuId;
use tokio::sync::Mutex;

use crate::{Emulator, FrameEncoder, TurnArbiter};

/// One registered session: the runtime handle plus the core-owned state
/// that rides along with it.
pub struct EmuEntry {
    pub id: EmuId,
    pub emulator: Arc<dyn Emulator>,
    /// Exclusive input rights for this session.
    pub turns: TurnArbiter,
    /// Per-session JPEG buffer; locked by whichever thread is pushing
    /// this session's frames.
    pub encoder: Mutex<FrameEncoder>,
}

impl EmuEntry {
    fn new(id: EmuId, emulator: Arc<dyn Emulator>) -> Self {
        Self {
            id,
            emulator,
            turns: TurnArbiter::new(),
            encoder: Mutex::new(FrameEncoder::new()),
        }
    }
}

/// Tracks active emulator sessions.
///
/// Sessions are added when a spawned runtime registers itself and are
/// only removed on global shutdown — `remove`/`stop` are reserved
/// commands. Mutations are serialized by the exclusive lock the server
/// wraps this registry in.
#[derive(Default)]
pub struct EmuRegistry {
    emus: HashMap<EmuId, Arc<EmuEntry>>,
}

impl EmuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under `id`, replacing (and logging over) any
    /// previous registration with the same id.
    pub fn add(&mut self, id: EmuId, emulator: Arc<dyn Emulator>) -> Arc<EmuEntry> {
        let entry = Arc::new(EmuEntry::new(id.clone(), emulator));
        if self.emus.insert(id.clone(), Arc::clone(&entry)).is_some() {
            tracing::warn!(emu = %id, "replacing existing session registration");
        } else {
            tracing::info!(emu = %id, "session registered");
        }
        entry
    }

    /// Looks up a session by id.
    pub fn lookup(&self, id: &EmuId) -> Option<Arc<EmuEntry>> {
        self.emus.get(id).cloned()
    }

    /// Snapshot of all active sessions.
    pub fn iterate(&self) -> Vec<Arc<EmuEntry>> {
        self.emus.values().cloned().collect()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.emus.len()
    }

    /// Returns `true` if no sessions are active.
    pub fn is_empty(&self) -> bool {
        self.emus.is_empty()
    }
}
