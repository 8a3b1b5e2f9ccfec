//! Flat counters: one running total, no time history.
//!
//! A [`FlatCounter`] is the cheapest thing the registry tracks. Threads add
//! to a private buffer through their cache, and the shared total only moves
//! when buffers are merged. The total saturates at the bounds of `i64`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::buffers::{Buffer, LocalBuffers};

/// Increments buffered on one thread for one counter.
pub(crate) type CounterBuffer = Buffer<i64>;

/// A named running total shared by every thread.
#[derive(Debug)]
pub struct FlatCounter {
    name: Box<str>,
    value: AtomicI64,
    locals: LocalBuffers<i64>,
}

impl FlatCounter {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            value: AtomicI64::new(0),
            locals: LocalBuffers::default(),
        }
    }

    /// Counter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merged total. Increments still buffered on other threads are not
    /// included; registry reads merge them first.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Add `amount` to the shared total.
    pub fn increment(&self, amount: i64) {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(amount);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reset to zero, discarding increments still buffered.
    pub fn reset(&self) {
        self.locals.for_each(|buffer| *buffer.lock() = 0);
        self.value.store(0, Ordering::Release);
    }

    /// Number of live thread-local buffers attached to this counter.
    #[must_use]
    pub fn attached_buffers(&self) -> usize {
        self.locals.live()
    }

    pub(crate) fn attach_local(&self) -> Arc<CounterBuffer> {
        self.locals.attach(0)
    }

    /// Returns `true` if the buffer held a non-zero amount.
    pub(crate) fn merge_buffer(&self, buffer: &CounterBuffer) -> bool {
        let pending = core::mem::take(&mut *buffer.lock());
        if pending == 0 {
            return false;
        }
        self.increment(pending);
        true
    }

    /// Fold every attached buffer into the total. Returns the number of
    /// buffers that held a non-zero amount.
    pub(crate) fn merge_locals(&self) -> usize {
        let mut pending = 0_i64;
        let merged = self.locals.drain(|buffer| {
            let taken = core::mem::take(buffer);
            pending = pending.saturating_add(taken);
            taken != 0
        });
        if merged > 0 {
            self.increment(pending);
        }
        merged
    }

    /// Total with every attached buffer merged.
    pub(crate) fn read(&self) -> i64 {
        self.merge_locals();
        self.value()
    }
}
