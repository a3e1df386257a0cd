//! Atom: a single-slot reference updated by compare-and-swap.
//!
//! The slot holds an `Arc<T>`; readers take a snapshot without blocking and
//! writers publish a whole new `Arc`, so no reader ever sees a partially built
//! value. `swap` is an optimistic loop: read, apply, publish only if the slot
//! still holds what was read, otherwise re-read and re-apply.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tracing::trace;

pub struct Atom<T> {
    slot: ArcSwap<T>,
}

impl<T> Atom<T> {
    pub fn new(initial: T) -> Self {
        Atom {
            slot: ArcSwap::from_pointee(initial),
        }
    }

    /// Current value. Never blocks.
    pub fn deref(&self) -> Arc<T> {
        self.slot.load_full()
    }

    /// Replace the value unconditionally and return it.
    pub fn reset(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        self.slot.store(Arc::clone(&next));
        next
    }

    /// Publish `new` only if the slot still holds exactly `current`.
    pub fn compare_and_set(&self, current: &Arc<T>, new: T) -> bool {
        let prev = self.slot.compare_and_swap(current, Arc::new(new));
        Arc::ptr_eq(&*prev, current)
    }

    /// Atomically replace the value with `f(current)` and return the value
    /// that was committed.
    ///
    /// `f` runs once per attempt and may run several times under contention,
    /// so it must not have observable side effects.
    pub fn swap<F>(&self, mut f: F) -> Arc<T>
    where
        F: FnMut(&T) -> T,
    {
        let mut current = self.slot.load_full();
        let mut retries = 0usize;
        loop {
            let next = Arc::new(f(&current));
            let prev = self.slot.compare_and_swap(&current, Arc::clone(&next));
            // `current` is still alive here, so its address cannot have been reused.
            if Arc::ptr_eq(&*prev, &current) {
                return next;
            }
            retries += 1;
            trace!(retries, "atom swap lost a race, retrying");
            current = Guard::into_inner(prev);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom").field("value", &self.deref()).finish()
    }
}
