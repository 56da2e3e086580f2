//! Per-connection ingress: register the user, decode frames into
//! commands, clean up on close.
//!
//! Ingress does no policy work — it validates nothing beyond "is this a
//! known verb" and never blocks on registries. Every decision happens in
//! the dispatcher, in command order.

use std::sync::Arc;

use crowdplay_protocol::{decode, CommandKind};
use crowdplay_transport::{Connection, Incoming};

use crate::state::Shared;
use crate::Command;

/// Drives one connection from accept to close.
pub(crate) async fn run_connection<C: Connection>(shared: Arc<Shared<C>>, conn: C) {
    let conn_id = conn.id();
    let addr = conn.remote_addr().to_owned();

    {
        let mut users = shared.users.write().await;
        users.on_connect(conn_id, conn.clone(), &addr);
    }

    loop {
        match conn.recv().await {
            Ok(Some(Incoming::Text(payload))) => {
                let mut fields = decode(&payload);
                if fields.is_empty() {
                    continue;
                }
                let kind = CommandKind::from_wire(&fields[0]);
                if kind == CommandKind::Unknown {
                    continue;
                }

                // Snapshot the originator while the user still exists;
                // the dispatcher re-resolves at execution time.
                let snapshot = {
                    let users = shared.users.read().await;
                    users
                        .get(conn_id)
                        .map(|e| (e.user.connected_emu.clone(), e.user.uuid()))
                };
                let Some((emu, uuid)) = snapshot else { break };

                tracing::trace!(%conn_id, %uuid, raw = %payload, "command received");

                shared.queue.push(Command {
                    kind,
                    params: fields.split_off(1),
                    conn: conn_id,
                    emu,
                    user: Some(uuid),
                });
            }
            // Binary frames from clients are not part of the protocol.
            Ok(Some(Incoming::Binary(_))) => continue,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "receive error");
                break;
            }
        }
    }

    crate::state::handle_disconnect(&shared, conn_id).await;
}
