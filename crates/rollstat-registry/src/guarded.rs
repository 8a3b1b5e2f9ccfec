//! A multi-level aggregate behind its own lock.
//!
//! [`GuardedAggregate`] is the unit stored in the registry. Besides the
//! aggregate it tracks which export types are enabled for the stat and the
//! thread-local buffers that feed it.
//!
//! Lock order is buffer list, then one buffer at a time, then the aggregate.
//! No path holds the aggregate lock while taking a buffer lock.

use parking_lot::Mutex;
use rollstat_timeseries::{Bucket, MultiLevelAggregate, TimePoint};
use std::sync::Arc;

use crate::buffers::{Buffer, LocalBuffers};
use crate::export::{AtomicExportSet, ExportSet, ExportType};

/// Per-thread accumulator for one stat, merged into the shared aggregate.
pub(crate) type LocalBuffer = Buffer<Bucket>;

/// A named aggregate shared by every thread recording into it.
#[derive(Debug)]
pub struct GuardedAggregate {
    name: Box<str>,
    aggregate: Mutex<MultiLevelAggregate>,
    exports: AtomicExportSet,
    locals: LocalBuffers<Bucket>,
}

impl GuardedAggregate {
    pub(crate) fn new(name: &str, aggregate: MultiLevelAggregate, exports: ExportSet) -> Self {
        Self {
            name: name.into(),
            aggregate: Mutex::new(aggregate),
            exports: AtomicExportSet::new(exports),
            locals: LocalBuffers::default(),
        }
    }

    /// Stat name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with the aggregate locked.
    ///
    /// Values still buffered in thread-local caches are not visible here;
    /// registry reads merge them first.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut MultiLevelAggregate) -> R) -> R {
        f(&mut self.aggregate.lock())
    }

    /// Record one value at `now`, bypassing any thread-local buffering.
    pub fn add_value(&self, now: TimePoint, value: i64) {
        self.add_value_aggregated(now, value, 1);
    }

    /// Record a pre-aggregated batch at `now`.
    pub fn add_value_aggregated(&self, now: TimePoint, sum: i64, count: u64) {
        self.aggregate.lock().add_value_aggregated(now, sum, count);
    }

    /// Export types currently enabled.
    #[must_use]
    pub fn exports(&self) -> ExportSet {
        self.exports.load()
    }

    /// Enable `export`. Returns `true` if it was not already enabled.
    pub fn enable_export(&self, export: ExportType) -> bool {
        self.exports.insert(export)
    }

    /// Disable `export`. Returns `true` if it was enabled.
    pub fn disable_export(&self, export: ExportType) -> bool {
        self.exports.remove(export)
    }

    /// Reset the aggregate, discarding values still buffered in
    /// thread-local caches.
    pub fn clear(&self) {
        self.locals.for_each(|buffer| buffer.lock().clear());
        self.aggregate.lock().clear();
    }

    /// Number of live thread-local buffers attached to this stat.
    #[must_use]
    pub fn attached_buffers(&self) -> usize {
        self.locals.live()
    }

    /// Create and attach a new thread-local buffer.
    pub(crate) fn attach_local(&self) -> Arc<LocalBuffer> {
        self.locals.attach(Bucket::EMPTY)
    }

    /// Fold one buffer's outstanding values into the aggregate at `now`.
    ///
    /// Returns `true` if the buffer held anything.
    pub(crate) fn merge_buffer(&self, now: TimePoint, buffer: &LocalBuffer) -> bool {
        let pending = buffer.lock().take();
        if pending == Bucket::EMPTY {
            return false;
        }
        self.add_value_aggregated(now, pending.sum, pending.count);
        true
    }

    /// Fold every attached buffer into the aggregate at `now`.
    ///
    /// Buffers are combined first so the aggregate lock is taken once.
    /// Returns the number of buffers that held values.
    pub(crate) fn merge_locals(&self, now: TimePoint) -> usize {
        let mut pending = Bucket::EMPTY;
        let merged = self.locals.drain(|buffer| {
            let taken = buffer.take();
            pending.merge(&taken);
            taken != Bucket::EMPTY
        });
        if merged > 0 {
            self.add_value_aggregated(now, pending.sum, pending.count);
        }
        merged
    }

    /// Merge outstanding buffers, advance to `now`, then run `f` on the
    /// aggregate under one lock acquisition.
    pub(crate) fn read_at<R>(
        &self,
        now: TimePoint,
        f: impl FnOnce(&MultiLevelAggregate) -> R,
    ) -> R {
        self.merge_locals(now);
        let mut aggregate = self.aggregate.lock();
        aggregate.flush(now);
        f(&aggregate)
    }
}
