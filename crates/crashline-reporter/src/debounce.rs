//! Single-slot debounce timer
//!
//! Collapses a burst of processing triggers into one pass. The timer holds
//! at most one pending task: arming it aborts whatever was pending and
//! starts the delay over.
//!
//! ```text
//! arm ──┐  arm ──┐        arm ──┐
//!       ✗ abort  ✗ abort        └── delay ──→ spawn_blocking(task)
//! ```

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cancel-and-reschedule timer running its task on the blocking pool
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    runtime: Handle,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            slot: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `task` once `delay` has passed without another `arm`.
    pub fn arm<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
            debug!("Debounce timer restarted");
        }

        let delay = self.delay;
        let runtime = self.runtime.clone();
        *slot = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Once the delay has elapsed the task is no longer cancellable.
            let _ = runtime.spawn_blocking(task).await;
        }));
    }

    /// Cancels the pending task; returns true if one was waiting
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Returns true while a task is waiting or running
    pub fn is_armed(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}
