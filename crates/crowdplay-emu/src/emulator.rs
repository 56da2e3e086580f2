//! The [`Emulator`] trait — the seam between the core and the runtime.
//!
//! The core does not load cores or run ROMs. An emulator runtime (a
//! dedicated thread or task, spawned by the launcher on `add`) implements
//! this trait and registers itself under its session id. The core then
//! talks to it through exactly three surfaces: the input sink, the frame
//! producer, and the membership callbacks.

use uuid::Uuid;

use crate::{Frame, InputDevice};

/// A running emulator session, as seen by the core.
///
/// All methods are called concurrently from the dispatcher, the frame
/// egress path, and disconnect handling, so implementations synchronize
/// internally.
pub trait Emulator: Send + Sync + 'static {
    /// Routes one joypad update into the session.
    ///
    /// Only called for the current turn holder; `id` has already been
    /// range-checked against the device class.
    fn set_input(&self, device: InputDevice, id: i16, value: i16);

    /// Returns the most recent rendered frame.
    ///
    /// A blank frame (zero width or height) means nothing has been
    /// rendered yet; egress skips it.
    fn frame(&self) -> Frame;

    /// A user joined this session as a viewer.
    fn user_connected(&self, user: Uuid);

    /// A viewer of this session disconnected.
    fn user_disconnected(&self, user: Uuid);
}
