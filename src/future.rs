use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Slot<T> {
    value: Mutex<Option<T>>,
    resolved: Condvar,
}

/// A single-assignment result cell shared across threads.
///
/// Cloning a `Future` hands out another reference to the same cell, so the
/// bus can keep one copy for resolution while the sender waits on another.
pub struct Future<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Future<T> {
    pub fn new() -> Self {
        Future {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Stores `value` and wakes every waiter. Resolving an already resolved
    /// future replaces the stored value.
    pub fn resolve(&self, value: T) {
        let mut slot = self.slot.value.lock();
        *slot = Some(value);
        self.slot.resolved.notify_all();
    }

    /// Stores `value` only if nothing was stored before, otherwise hands the
    /// value back.
    pub fn try_resolve(&self, value: T) -> Result<(), T> {
        let mut slot = self.slot.value.lock();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        self.slot.resolved.notify_all();
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.slot.value.lock().is_some()
    }
}

impl<T: Clone> Future<T> {
    /// Blocks the calling thread until the future is resolved.
    pub fn get(&self) -> T {
        let mut slot = self.slot.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.slot.resolved.wait(&mut slot);
        }
    }

    /// Blocks for at most `timeout`. Returns `None` if the future was not
    /// resolved before the deadline.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        // A deadline too far away to represent is the same as no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return Some(value.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.slot.resolved.wait_until(&mut slot, deadline).timed_out() {
                        return slot.as_ref().cloned();
                    }
                }
                None => self.slot.resolved.wait(&mut slot),
            }
        }
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("done", &self.is_done())
            .finish()
    }
}
