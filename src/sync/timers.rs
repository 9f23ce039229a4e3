//! Cancellable one-shot timers that report back through the sync channel.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::{SyncMsg, SyncSender};

/// A single re-armable timer.
///
/// Arming aborts the previous sleep and bumps the generation; the fired
/// message carries the generation it was armed with, and [`TimerSlot::fire`]
/// only accepts the current one. A message that was already queued when the
/// timer got cancelled or re-armed is therefore ignored.
#[derive(Debug, Default)]
pub struct TimerSlot {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl TimerSlot {
    pub fn arm<F>(&mut self, rt: &Handle, delay: Duration, tx: &SyncSender, make: F) -> u64
    where
        F: FnOnce(u64) -> SyncMsg + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let tx = tx.clone();
        let task = rt.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make(generation));
        });
        self.handle = Some(task.abort_handle());
        generation
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Accept a fired message if it belongs to the live arming.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}
