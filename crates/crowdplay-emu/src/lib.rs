//! Emulator session management for Crowdplay.
//!
//! An emulator session is a long-running computational workload with an
//! input sink and a frame producer. This crate owns everything the core
//! knows about one:
//!
//! - **Interface types** ([`Frame`], [`InputDevice`]) and the
//!   [`Emulator`] trait the runtime implements.
//! - **Registry** ([`EmuRegistry`]) — id → session, exclusive-locked at
//!   the server level.
//! - **Turn arbitration** ([`TurnArbiter`]) — the per-session FIFO that
//!   grants exclusive input rights.
//! - **Frame encoding** ([`FrameEncoder`]) — RGB → JPEG with a reusable
//!   per-session buffer.
//!
//! The emulator runtime itself (core loading, ROM execution, frame
//! production) lives outside the core; it registers an [`Emulator`]
//! implementation here and pushes frames through the server handle.

mod emulator;
mod encode;
mod error;
mod registry;
mod turns;
mod types;

pub use emulator::Emulator;
pub use encode::FrameEncoder;
pub use error::EmuError;
pub use registry::{EmuEntry, EmuRegistry};
pub use turns::{TurnArbiter, TurnGrant, TurnRemoval};
pub use types::{Frame, InputDevice};
