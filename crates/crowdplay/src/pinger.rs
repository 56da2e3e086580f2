//! The liveness pinger: periodically pings everyone, reaps the silent.

use std::sync::Arc;
use std::time::Duration;

use crowdplay_protocol::encode;
use crowdplay_transport::Connection;

use crate::state::Shared;

/// How often the sweep runs.
pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Runs the ping loop until shutdown.
///
/// Each sweep partitions users by silence: anyone whose last `pong` is
/// older than the configured timeout is closed with "Timed out" (their
/// ingress task then performs the normal disconnect cleanup); everyone
/// else receives a `ping`.
pub(crate) async fn run<C: Connection>(shared: Arc<Shared<C>>, interval: Duration) {
    let ping = encode(&["ping".into()]);
    let mut shutdown = shared.shutdown_watch();

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
        if !shared.is_running() {
            break;
        }

        let timeout = shared.config.read().await.client_timeout;
        let mut dead = Vec::new();
        let mut live = Vec::new();
        {
            let users = shared.users.read().await;
            for (_, entry) in users.iter() {
                if entry.user.timed_out(timeout) {
                    dead.push(entry.conn.clone());
                } else {
                    live.push(entry.conn.clone());
                }
            }
        }

        for conn in dead {
            tracing::info!(conn = %conn.id(), "closing silent client");
            let _ = conn.close("Timed out").await;
        }
        for conn in live {
            let _ = conn.send_text(&ping).await;
        }
    }

    tracing::debug!("pinger stopped");
}
