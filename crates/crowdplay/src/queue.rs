//! The command queue: unbounded FIFO between ingress and the dispatcher.
//!
//! Producers are the per-connection ingress tasks and, once, the shutdown
//! routine. The single consumer is the dispatcher. A `Notify` plays the
//! condition variable: `notify_one` stores a permit when no one is
//! waiting, and the consumer always re-checks the deque before parking,
//! so wake-ups are never lost.
//!
//! Shutdown needs to empty the queue from *outside* the consumer and
//! plant a single terminal sentinel — which is why this is a shared
//! deque under a lock rather than an mpsc channel.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::Command;

#[derive(Default)]
pub(crate) struct CommandQueue {
    inner: Mutex<VecDeque<Command>>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command and wakes the dispatcher.
    pub fn push(&self, cmd: Command) {
        self.inner.lock().unwrap().push_back(cmd);
        self.notify.notify_one();
    }

    /// Removes and returns the oldest command, waiting if empty.
    pub async fn pop(&self) -> Command {
        loop {
            if let Some(cmd) = self.inner.lock().unwrap().pop_front() {
                return cmd;
            }
            self.notify.notified().await;
        }
    }

    /// Discards every queued command, enqueues `sentinel` as the sole
    /// remaining entry, and wakes the dispatcher.
    pub fn drain_and_plant(&self, sentinel: Command) {
        let mut queue = self.inner.lock().unwrap();
        let dropped = queue.len();
        queue.clear();
        queue.push_back(sentinel);
        drop(queue);
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued commands for shutdown");
        }
        self.notify.notify_one();
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
