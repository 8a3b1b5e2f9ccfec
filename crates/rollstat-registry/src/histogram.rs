//! A timeseries histogram behind its own lock.
//!
//! [`GuardedHistogram`] is what the registry stores for a histogram name.
//! Alongside the histogram it keeps the enabled export types, the
//! percentiles to publish as counters, and the thread-local buffers that
//! feed it. A buffer holds one pre-aggregated batch per value bucket, so a
//! thread never needs the shared lock to record a value.
//!
//! Lock order matches [`GuardedAggregate`](crate::GuardedAggregate): buffer
//! list, then one buffer, then the histogram.

use parking_lot::Mutex;
use rollstat_timeseries::{Bucket, HistogramGeometry, TimePoint, TimeseriesHistogram};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::buffers::{Buffer, LocalBuffers};
use crate::error::{RegistryError, RegistryResult};
use crate::export::{AtomicExportSet, ExportSet, ExportType};

/// Per-thread batches for one histogram, indexed like its value buckets.
pub(crate) type HistogramBuffer = Buffer<Vec<Bucket>>;

/// A named histogram shared by every thread recording into it.
#[derive(Debug)]
pub struct GuardedHistogram {
    name: Box<str>,
    geometry: HistogramGeometry,
    histogram: Mutex<TimeseriesHistogram>,
    exports: AtomicExportSet,
    percentiles: Mutex<BTreeSet<u8>>,
    locals: LocalBuffers<Vec<Bucket>>,
}

impl GuardedHistogram {
    pub(crate) fn new(name: &str, histogram: TimeseriesHistogram) -> Self {
        Self {
            name: name.into(),
            geometry: histogram.geometry(),
            histogram: Mutex::new(histogram),
            exports: AtomicExportSet::default(),
            percentiles: Mutex::new(BTreeSet::new()),
            locals: LocalBuffers::default(),
        }
    }

    /// Histogram name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value range layout.
    #[must_use]
    pub const fn geometry(&self) -> HistogramGeometry {
        self.geometry
    }

    /// Run `f` with the histogram locked. Thread-local buffers are not
    /// merged first.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut TimeseriesHistogram) -> R) -> R {
        f(&mut self.histogram.lock())
    }

    /// Record one value at `now`, bypassing any thread-local buffering.
    pub fn add_value(&self, now: TimePoint, value: i64) {
        self.histogram.lock().add_value(now, value);
    }

    /// Record `value` seen `times` times at `now`.
    pub fn add_value_times(&self, now: TimePoint, value: i64, times: u64) {
        self.histogram.lock().add_value_times(now, value, times);
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

    /// Publish the `pct`th percentile as a counter. Returns `true` if it
    /// was not already published.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPercentile`] if `pct` exceeds 100.
    pub fn export_percentile(&self, pct: u8) -> RegistryResult<bool> {
        if pct > 100 {
            return Err(RegistryError::InvalidPercentile(pct));
        }
        Ok(self.percentiles.lock().insert(pct))
    }

    /// Stop publishing the `pct`th percentile. Returns `true` if it was
    /// published.
    pub fn unexport_percentile(&self, pct: u8) -> bool {
        self.percentiles.lock().remove(&pct)
    }

    /// Published percentiles, ascending.
    #[must_use]
    pub fn exported_percentiles(&self) -> Vec<u8> {
        self.percentiles.lock().iter().copied().collect()
    }

    /// Reset every bucket, discarding values still buffered in
    /// thread-local caches.
    pub fn clear(&self) {
        self.locals.for_each(|buffer| {
            for batch in buffer.lock().iter_mut() {
                batch.clear();
            }
        });
        self.histogram.lock().clear();
    }

    /// Number of live thread-local buffers attached to this histogram.
    #[must_use]
    pub fn attached_buffers(&self) -> usize {
        self.locals.live()
    }

    pub(crate) fn attach_local(&self) -> Arc<HistogramBuffer> {
        self.locals.attach(vec![Bucket::EMPTY; self.geometry.num_buckets()])
    }

    /// Fold one buffer into the histogram at `now`. Returns `true` if the
    /// buffer held anything.
    pub(crate) fn merge_buffer(&self, now: TimePoint, buffer: &HistogramBuffer) -> bool {
        let pending: Vec<Bucket> = {
            let mut batches = buffer.lock();
            if batches.iter().all(Bucket::is_empty) {
                return false;
            }
            batches.iter_mut().map(Bucket::take).collect()
        };
        self.histogram.lock().add_bucket_values(now, &pending);
        true
    }

    /// Fold every attached buffer into the histogram at `now`, taking the
    /// histogram lock once. Returns the number of buffers that held values.
    pub(crate) fn merge_locals(&self, now: TimePoint) -> usize {
        let mut pending = vec![Bucket::EMPTY; self.geometry.num_buckets()];
        let merged = self.locals.drain(|batches| {
            if batches.iter().all(Bucket::is_empty) {
                return false;
            }
            for (total, batch) in pending.iter_mut().zip(batches.iter_mut()) {
                total.merge(&batch.take());
            }
            true
        });
        if merged > 0 {
            self.histogram.lock().add_bucket_values(now, &pending);
        }
        merged
    }

    /// Merge outstanding buffers, advance every bucket to `now`, then run
    /// `f` under one lock acquisition.
    pub(crate) fn read_at<R>(
        &self,
        now: TimePoint,
        f: impl FnOnce(&TimeseriesHistogram) -> R,
    ) -> R {
        self.merge_locals(now);
        let mut histogram = self.histogram.lock();
        histogram.update(now);
        f(&histogram)
    }
}
