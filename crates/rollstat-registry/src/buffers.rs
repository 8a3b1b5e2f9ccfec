//! Weakly held per-thread buffers feeding one shared stat.
//!
//! A thread's cache owns its buffer; the shared stat keeps only a weak
//! reference so it can fold outstanding values in while the thread is
//! alive. Dead entries are pruned whenever the list is walked.
//!
//! Lock order is the list, then one buffer at a time. Callers never hold
//! the shared stat's own lock while walking buffers.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// One thread's pending contribution to a shared stat.
pub(crate) type Buffer<T> = Mutex<T>;

#[derive(Debug)]
pub(crate) struct LocalBuffers<T> {
    slots: Mutex<Vec<Weak<Buffer<T>>>>,
}

impl<T> Default for LocalBuffers<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }
}

impl<T> LocalBuffers<T> {
    /// Attach a new buffer starting at `initial`.
    pub(crate) fn attach(&self, initial: T) -> Arc<Buffer<T>> {
        let buffer = Arc::new(Mutex::new(initial));
        let mut slots = self.slots.lock();
        slots.retain(|weak| weak.strong_count() > 0);
        slots.push(Arc::downgrade(&buffer));
        buffer
    }

    /// Number of live buffers.
    pub(crate) fn live(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.retain(|weak| weak.strong_count() > 0);
        slots.len()
    }

    /// Visit every live buffer.
    pub(crate) fn for_each(&self, mut visit: impl FnMut(&Buffer<T>)) {
        let mut slots = self.slots.lock();
        slots.retain(|weak| match weak.upgrade() {
            Some(buffer) => {
                visit(&buffer);
                true
            }
            None => false,
        });
    }

    /// Visit every live buffer, counting those for which `drain` reports
    /// taking something.
    pub(crate) fn drain(&self, mut drain: impl FnMut(&mut T) -> bool) -> usize {
        let mut drained = 0_usize;
        self.for_each(|buffer| {
            if drain(&mut buffer.lock()) {
                drained = drained.saturating_add(1);
            }
        });
        drained
    }
}
