//! The per-session turn arbiter.
//!
//! An ordered FIFO of weak user references (uuids). At most one user of a
//! session holds the turn at any time — that exclusivity is this module's
//! sole responsibility. The arbiter itself is pure bookkeeping: the
//! server applies the resulting flag changes to users and schedules the
//! expiry timers, re-resolving each uuid at use site so a concurrent
//! disconnect is always observable.
//!
//! ```text
//! request ──→ [ queue ] ──promote──→ holder ──expire/remove──→ next
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

/// A freshly granted turn.
///
/// `generation` uniquely identifies this grant: the expiry timer carries
/// it back, and a stale generation (the turn already ended some other
/// way) makes the timer a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnGrant {
    pub holder: Uuid,
    pub generation: u64,
}

/// What changed when a user was removed from the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRemoval {
    /// The removed user was the current holder.
    pub was_holder: bool,
    /// The follow-up grant, if the head of the queue was promoted.
    pub next: Option<TurnGrant>,
}

#[derive(Default)]
struct TurnState {
    queue: VecDeque<Uuid>,
    holder: Option<Uuid>,
    generation: u64,
}

impl TurnState {
    fn promote_next(&mut self) -> Option<TurnGrant> {
        debug_assert!(self.holder.is_none());
        let next = self.queue.pop_front()?;
        self.holder = Some(next);
        self.generation += 1;
        Some(TurnGrant {
            holder: next,
            generation: self.generation,
        })
    }
}

/// FIFO turn queue plus the current holder, for one session.
#[derive(Default)]
pub struct TurnArbiter {
    inner: Mutex<TurnState>,
}

impl TurnArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user to the queue. Returns `false` (and does nothing)
    /// if the user is already queued or already holds the turn.
    pub fn request(&self, user: Uuid) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.holder == Some(user) || state.queue.contains(&user) {
            return false;
        }
        state.queue.push_back(user);
        true
    }

    /// Promotes the head of the queue if no one holds the turn.
    pub fn promote(&self) -> Option<TurnGrant> {
        let mut state = self.inner.lock().unwrap();
        if state.holder.is_some() {
            return None;
        }
        state.promote_next()
    }

    /// Ends the turn identified by `generation` and promotes the next
    /// user. Returns `None` if that turn already ended (stale timer).
    pub fn expire(&self, generation: u64) -> Option<(Uuid, Option<TurnGrant>)> {
        let mut state = self.inner.lock().unwrap();
        if state.generation != generation {
            return None;
        }
        let released = state.holder.take()?;
        let next = state.promote_next();
        Some((released, next))
    }

    /// Drops a user from the arbiter (disconnect, or a promoted uuid
    /// that no longer resolves). If they held the turn, the next queued
    /// user is promoted.
    pub fn remove(&self, user: Uuid) -> TurnRemoval {
        let mut state = self.inner.lock().unwrap();
        if state.holder == Some(user) {
            state.holder = None;
            let next = state.promote_next();
            return TurnRemoval {
                was_holder: true,
                next,
            };
        }
        state.queue.retain(|u| *u != user);
        TurnRemoval {
            was_holder: false,
            next: None,
        }
    }

    /// The current turn holder, if any.
    pub fn holder(&self) -> Option<Uuid> {
        self.inner.lock().unwrap().holder
    }

    /// How many users are waiting (not counting the holder).
    pub fn queue_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}
