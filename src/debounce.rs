//! Single-slot change debouncer
//!
//! The OS can report one logical default-device change several times in a
//! row. [`ChangeDebouncer`] collapses such a burst: each `schedule` replaces
//! the pending payload and restarts the delay, and only the last payload is
//! delivered once things go quiet.
//!
//! Every schedule bumps a generation counter under the slot lock. A timer
//! only delivers if its generation is still current when it wakes, so a
//! superseded timer can never deliver, even if its abort arrives too late.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

struct Slot<T> {
    generation: u64,
    payload: Option<T>,
    timer: Option<JoinHandle<()>>,
}

/// Coalesces bursts of events into one delayed delivery
///
/// `schedule` can be called from any thread, including threads outside the
/// tokio runtime (OS callback threads); timers run on the runtime behind the
/// handle given at construction. `deliver` runs without the slot lock held,
/// so it may call `schedule` again.
pub struct ChangeDebouncer<T> {
    slot: Arc<Mutex<Slot<T>>>,
    runtime: Handle,
}

impl<T: Send + 'static> ChangeDebouncer<T> {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                payload: None,
                timer: None,
            })),
            runtime,
        }
    }

    /// Replace any pending payload with `payload` and (re)arm the timer
    ///
    /// After `delay` without another `schedule`, `deliver` is called exactly
    /// once with the last payload.
    pub fn schedule<F>(&self, delay: Duration, payload: T, deliver: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        if let Some(timer) = slot.timer.take() {
            // Never waits: a timer already past its generation check just finishes
            timer.abort();
            trace!("Debounce superseded (generation {})", generation);
        }
        slot.payload = Some(payload);

        let shared = Arc::clone(&self.slot);
        slot.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let payload = {
                let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.generation != generation {
                    return;
                }
                slot.timer = None;
                slot.payload.take()
            };

            if let Some(payload) = payload {
                deliver(payload);
            }
        }));
    }

    /// Drop the pending payload and timer, if any (best effort on shutdown)
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation = slot.generation.wrapping_add(1);
        slot.payload = None;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }

    /// Whether a payload is waiting for its delay to pass
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .payload
            .is_some()
    }
}

impl<T> Drop for ChangeDebouncer<T> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}
