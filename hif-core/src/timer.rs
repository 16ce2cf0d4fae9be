//! Delayed re-entry into the task queue.
//!
//! A timer never touches driver state itself: its fire closure only submits a
//! task. Firing and cancelling share one lock, so once [`HifTimer::cancel`]
//! returns no fire closure from an earlier arm can run. A task that was
//! already submitted stays queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct HifTimer {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl HifTimer {
    pub fn new(name: &'static str) -> Self {
        Self { name, slot: Arc::default() }
    }

    /// (Re)arms a one-shot timer, replacing any pending arm.
    pub fn arm<F>(&self, after: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        let armed = Self::bump(&mut slot);
        let shared = Arc::clone(&self.slot);
        let name = self.name;
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut slot = lock(&shared);
            if slot.generation != armed {
                return;
            }
            slot.generation = slot.generation.wrapping_add(1);
            slot.handle = None;
            tracing::trace!(timer = name, "fired");
            fire();
        }));
    }

    /// Arms a repeating timer. `tick` returning `false` stops it.
    pub fn arm_periodic<F>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        let armed = Self::bump(&mut slot);
        let shared = Arc::clone(&self.slot);
        slot.handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let keep = {
                    let slot = lock(&shared);
                    slot.generation == armed && tick()
                };
                if !keep {
                    return;
                }
            }
        }));
    }

    /// Stops the timer. Safe to call when it is not armed.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        if slot.handle.is_some() {
            tracing::trace!(timer = self.name, "cancelled");
        }
        Self::bump(&mut slot);
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn bump(slot: &mut Slot) -> u64 {
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation
    }
}

impl Drop for HifTimer {
    fn drop(&mut self) {
        // The slot is held while a fire closure runs; that arm is already spent.
        if let Ok(mut slot) = self.slot.try_lock() {
            Self::bump(&mut slot);
        }
    }
}
