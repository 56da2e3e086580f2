//! The broadcast engine: fan-out to all users, one user, or one session.
//!
//! Recipients are snapshotted under a shared registry lock and sends
//! happen outside it, so a slow client never stalls connect/disconnect.
//! Per-recipient send failures are dropped — a dead peer will be reaped
//! by the pinger, and frames are inherently stale anyway.

use crowdplay_protocol::EmuId;
use crowdplay_transport::Connection;

use crate::state::Shared;

impl<C: Connection> Shared<C> {
    /// Sends to every user with a non-empty username.
    pub async fn broadcast_all(&self, payload: &str) {
        let conns: Vec<C> = {
            let users = self.users.read().await;
            users
                .iter()
                .filter(|(_, e)| !e.user.username.is_empty())
                .map(|(_, e)| e.conn.clone())
                .collect()
        };
        for conn in conns {
            self.broadcast_one(&conn, payload).await;
        }
    }

    /// Sends to one connection; errors are dropped.
    pub async fn broadcast_one(&self, conn: &C, payload: &str) {
        if let Err(e) = conn.send_text(payload).await {
            tracing::debug!(conn = %conn.id(), error = %e, "send failed");
        }
    }

    /// As [`broadcast_all`](Self::broadcast_all), filtered to members of
    /// one session. The empty id addresses the lobby — users not yet
    /// connected to any session.
    pub async fn broadcast_session(&self, session: &EmuId, payload: &str) {
        let conns: Vec<C> = {
            let users = self.users.read().await;
            users
                .iter()
                .filter(|(_, e)| {
                    e.user.connected_emu == *session && !e.user.username.is_empty()
                })
                .map(|(_, e)| e.conn.clone())
                .collect()
        };
        for conn in conns {
            self.broadcast_one(&conn, payload).await;
        }
    }

    /// Every connection viewing `session`, for binary frame fan-out.
    ///
    /// Unlike text broadcasts there is no username filter: a viewer is a
    /// viewer the moment their `connected_emu` matches.
    pub async fn session_viewers(&self, session: &EmuId) -> Vec<C> {
        let users = self.users.read().await;
        users
            .iter()
            .filter(|(_, e)| e.user.connected_emu == *session)
            .map(|(_, e)| e.conn.clone())
            .collect()
    }
}
