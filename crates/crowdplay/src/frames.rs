//! Frame egress: pull a session's frame, compress, fan out.
//!
//! Invoked by emulator runtimes (typically from their own session
//! thread) through [`ServerHandle::send_frame`](crate::ServerHandle).
//! Each session owns one [`FrameEncoder`](crowdplay_emu::FrameEncoder),
//! so the JPEG buffer is reused across invocations instead of being
//! reallocated per frame.

use crowdplay_emu::EmuError;
use crowdplay_protocol::EmuId;
use crowdplay_transport::Connection;

use crate::state::Shared;
use crate::CrowdplayError;

impl<C: Connection> Shared<C> {
    /// Compresses the session's current frame and sends it as a binary
    /// WebSocket frame to every viewer.
    ///
    /// A blank frame (the runtime hasn't rendered yet) is skipped
    /// silently. Failed sends are dropped per recipient — a frame is
    /// stale the moment the next one exists, so there is nothing to
    /// retry.
    pub async fn send_frame(&self, session: &EmuId) -> Result<(), CrowdplayError> {
        let entry = self
            .emus
            .lock()
            .await
            .lookup(session)
            .ok_or_else(|| EmuError::NotFound(session.clone()))?;

        let frame = entry.emulator.frame();
        if frame.is_blank() {
            return Ok(());
        }

        let quality = self.config.read().await.jpeg_quality;
        let mut encoder = entry.encoder.lock().await;
        let jpeg = encoder.encode(&frame, quality).map_err(CrowdplayError::Emu)?;

        for conn in self.session_viewers(session).await {
            if let Err(e) = conn.send_binary(jpeg).await {
                tracing::debug!(conn = %conn.id(), error = %e, "frame send failed");
            }
        }
        Ok(())
    }
}
