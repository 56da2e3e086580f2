//! The user registry: canonical map from connection handle to user.
//!
//! This is the single owner of every [`User`]. Commands and turn queues
//! hold a uuid and re-look-up here at use site, so a concurrent
//! disconnect is always observable — a missing entry means the user is
//! gone and the operation is dropped.

use std::collections::HashMap;

use crowdplay_transport::ConnectionId;
use rand::Rng;
use uuid::Uuid;

use crate::User;

/// A registry slot: the user plus the channel to reach them.
///
/// `C` is the transport's connection type; the registry itself never
/// calls into it, it only hands clones to the broadcast engine.
#[derive(Debug)]
pub struct UserEntry<C> {
    pub conn: C,
    pub user: User,
}

/// Tracks all live connections and their users.
pub struct UserRegistry<C> {
    users: HashMap<ConnectionId, UserEntry<C>>,
}

impl<C: Clone> UserRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    /// Creates a user for a newly accepted connection.
    ///
    /// The username starts empty; the client is expected to send a
    /// `username` command (and receive a guest name if it fails
    /// validation).
    pub fn on_connect(&mut self, id: ConnectionId, conn: C, remote_addr: &str) -> Uuid {
        let user = User::new(remote_addr);
        let uuid = user.uuid();
        tracing::info!(%id, %uuid, addr = remote_addr, "user connected");
        self.users.insert(id, UserEntry { conn, user });
        uuid
    }

    /// Removes and returns the entry for a closed connection.
    ///
    /// Session-membership cleanup (the `leave` broadcast, the emulator's
    /// disconnect callback, turn-arbiter removal) is the server's job and
    /// happens before this is called.
    pub fn on_disconnect(&mut self, id: ConnectionId) -> Option<UserEntry<C>> {
        let entry = self.users.remove(&id);
        if let Some(entry) = &entry {
            tracing::info!(
                %id,
                uuid = %entry.user.uuid(),
                username = %entry.user.username,
                "user disconnected"
            );
        }
        entry
    }

    /// Looks up the entry for a connection, if still live.
    pub fn get(&self, id: ConnectionId) -> Option<&UserEntry<C>> {
        self.users.get(&id)
    }

    /// Mutable lookup for the dispatcher and pinger.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut UserEntry<C>> {
        self.users.get_mut(&id)
    }

    /// Re-resolves a weak user reference (a uuid) to its live entry.
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<(ConnectionId, &UserEntry<C>)> {
        self.users
            .iter()
            .find(|(_, e)| e.user.uuid() == uuid)
            .map(|(id, e)| (*id, e))
    }

    /// Mutable variant of [`find_by_uuid`](Self::find_by_uuid).
    pub fn find_by_uuid_mut(
        &mut self,
        uuid: Uuid,
    ) -> Option<(ConnectionId, &mut UserEntry<C>)> {
        self.users
            .iter_mut()
            .find(|(_, e)| e.user.uuid() == uuid)
            .map(|(id, e)| (*id, e))
    }

    /// True iff any other live user holds `name` (case-sensitive).
    pub fn username_taken(&self, name: &str, excluding: Uuid) -> bool {
        self.users
            .values()
            .any(|e| e.user.uuid() != excluding && e.user.username == name)
    }

    /// Iterates all live entries.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &UserEntry<C>)> {
        self.users.iter().map(|(id, e)| (*id, e))
    }

    /// Mutable iteration, for the pinger's sweep.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut UserEntry<C>)> {
        self.users.iter_mut().map(|(id, e)| (*id, e))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if no one is connected.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Picks a free guest name (`guest` + a number below 100000) and
    /// assigns it to the given user, returning `(old, new)` for the
    /// caller's reply. Retries until the name is unowned.
    pub fn assign_guest_name(&mut self, id: ConnectionId) -> Option<(String, String)> {
        let uuid = self.get(id)?.user.uuid();

        let mut rng = rand::rng();
        let name = loop {
            let candidate = format!("guest{}", rng.random_range(0..100_000u32));
            if !self.username_taken(&candidate, uuid) {
                break candidate;
            }
        };

        let entry = self.get_mut(id)?;
        let old = std::mem::replace(&mut entry.user.username, name.clone());
        tracing::info!(%uuid, old = %old, new = %name, "assigned guest name");
        Some((old, name))
    }
}

impl<C: Clone> Default for UserRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
