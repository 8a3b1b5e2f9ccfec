//! Per-thread fast path for recording stats by name.
//!
//! A [`ThreadLocalCache`] belongs to one thread. The first update of a name
//! resolves it in the shared registry and caches a handle; every later
//! update on that thread goes into the handle's private buffer and touches
//! no shared lock. Buffers are folded into the shared stats by
//! [`NamedRegistry::aggregate`], by any registry read of the name, by
//! [`ThreadLocalCache::flush`], and when the cache is dropped.
//!
//! Stats, histograms and flat counters are cached separately, each keyed
//! by name.

use rollstat_timeseries::{HistogramGeometry, TimePoint};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::counter::{CounterBuffer, FlatCounter};
use crate::export::{ExportSet, ExportType};
use crate::guarded::{GuardedAggregate, LocalBuffer};
use crate::histogram::{GuardedHistogram, HistogramBuffer};
use crate::registry::NamedRegistry;

/// Cached lookup of one stat on one thread.
///
/// The handle does not keep the shared aggregate alive; it owns only its
/// buffer and a copy of the export flags this thread has already enabled.
#[derive(Debug)]
pub struct StatHandle {
    target: Weak<GuardedAggregate>,
    buffer: Arc<LocalBuffer>,
    exports: ExportSet,
}

impl StatHandle {
    fn attach(stat: &Arc<GuardedAggregate>) -> Self {
        Self {
            target: Arc::downgrade(stat),
            buffer: stat.attach_local(),
            exports: stat.exports(),
        }
    }

    /// Export types this handle has seen enabled.
    #[must_use]
    pub const fn exports(&self) -> ExportSet {
        self.exports
    }

    /// Values buffered on this thread and not yet merged.
    #[must_use]
    pub fn pending(&self) -> (i64, u64) {
        let bucket = *self.buffer.lock();
        (bucket.sum, bucket.count)
    }

    fn record(&self, sum: i64, count: u64) {
        self.buffer.lock().add(sum, count);
    }

    fn enable_export(&mut self, export: ExportType) {
        if self.exports.insert(export) {
            if let Some(stat) = self.target.upgrade() {
                stat.enable_export(export);
            }
        }
    }

    fn disable_export(&mut self, export: ExportType) {
        self.exports.remove(export);
    }

    fn merge(&self, now: TimePoint) -> bool {
        self.target
            .upgrade()
            .is_some_and(|stat| stat.merge_buffer(now, &self.buffer))
    }
}

#[derive(Debug)]
struct CounterHandle {
    target: Weak<FlatCounter>,
    buffer: Arc<CounterBuffer>,
}

impl CounterHandle {
    fn attach(counter: &Arc<FlatCounter>) -> Self {
        Self {
            target: Arc::downgrade(counter),
            buffer: counter.attach_local(),
        }
    }

    fn record(&self, amount: i64) {
        let mut pending = self.buffer.lock();
        *pending = pending.saturating_add(amount);
    }

    fn merge(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|counter| counter.merge_buffer(&self.buffer))
    }
}

#[derive(Debug)]
struct HistogramHandle {
    target: Weak<GuardedHistogram>,
    geometry: HistogramGeometry,
    buffer: Arc<HistogramBuffer>,
}

impl HistogramHandle {
    fn attach(histogram: &Arc<GuardedHistogram>) -> Self {
        Self {
            target: Arc::downgrade(histogram),
            geometry: histogram.geometry(),
            buffer: histogram.attach_local(),
        }
    }

    fn record(&self, value: i64) {
        let index = self.geometry.bucket_index(value);
        if let Some(batch) = self.buffer.lock().get_mut(index) {
            batch.add(value, 1);
        }
    }

    fn merge(&self, now: TimePoint) -> bool {
        self.target
            .upgrade()
            .is_some_and(|histogram| histogram.merge_buffer(now, &self.buffer))
    }
}

/// One thread's cache of stat, histogram and counter handles.
#[derive(Debug)]
pub struct ThreadLocalCache {
    registry: Arc<NamedRegistry>,
    handles: HashMap<Box<str>, StatHandle>,
    counters: HashMap<Box<str>, CounterHandle>,
    histograms: HashMap<Box<str>, HistogramHandle>,
}

impl ThreadLocalCache {
    /// Create an empty cache over `registry`.
    #[must_use]
    pub fn new(registry: Arc<NamedRegistry>) -> Self {
        Self {
            registry,
            handles: HashMap::new(),
            counters: HashMap::new(),
            histograms: HashMap::new(),
        }
    }

    /// The registry this cache feeds.
    #[must_use]
    pub const fn registry(&self) -> &Arc<NamedRegistry> {
        &self.registry
    }

    /// Number of cached handles of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles
            .len()
            .saturating_add(self.counters.len())
            .saturating_add(self.histograms.len())
    }

    /// Whether no handle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached handle for `name`, if this thread has used it.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&StatHandle> {
        self.handles.get(name)
    }

    /// Record one value for `name`.
    pub fn add_stat_value(&mut self, name: &str, value: i64) {
        self.add_stat_value_aggregated(name, value, 1);
    }

    /// Record `count` samples summing to `sum` for `name`.
    pub fn add_stat_value_aggregated(&mut self, name: &str, sum: i64, count: u64) {
        if let Some(handle) = self.handles.get(name) {
            handle.record(sum, count);
            return;
        }
        let handle = StatHandle::attach(&self.registry.resolve(name));
        handle.record(sum, count);
        self.handles.insert(name.into(), handle);
    }

    /// Record one value for `name` and make sure `export` is enabled for it.
    ///
    /// Once this thread has enabled an export type for a name, later calls
    /// only check the handle's local flags.
    pub fn add_stat_value_with_export(&mut self, name: &str, value: i64, export: ExportType) {
        if let Some(handle) = self.handles.get_mut(name) {
            handle.record(value, 1);
            handle.enable_export(export);
            return;
        }
        let mut handle = StatHandle::attach(&self.registry.resolve(name));
        handle.record(value, 1);
        handle.enable_export(export);
        self.handles.insert(name.into(), handle);
    }

    /// Add `amount` to the flat counter `name`.
    pub fn increment_counter(&mut self, name: &str, amount: i64) {
        if let Some(handle) = self.counters.get(name) {
            handle.record(amount);
            return;
        }
        let handle = CounterHandle::attach(&self.registry.resolve_counter(name));
        handle.record(amount);
        self.counters.insert(name.into(), handle);
    }

    /// Increments of flat counter `name` buffered on this thread.
    #[must_use]
    pub fn pending_increments(&self, name: &str) -> Option<i64> {
        self.counters.get(name).map(|handle| *handle.buffer.lock())
    }

    /// Record `value` into histogram `name`.
    ///
    /// Returns `false`, recording nothing, if no histogram of that name has
    /// been defined in the registry.
    pub fn add_histogram_value(&mut self, name: &str, value: i64) -> bool {
        if let Some(handle) = self.histograms.get(name) {
            handle.record(value);
            return true;
        }
        let Some(histogram) = self.registry.histogram(name) else {
            return false;
        };
        let handle = HistogramHandle::attach(&histogram);
        handle.record(value);
        self.histograms.insert(name.into(), handle);
        true
    }

    /// Disable `export` for `name`, both on this thread and in the registry.
    pub fn clear_stat_export(&mut self, name: &str, export: ExportType) {
        if let Some(handle) = self.handles.get_mut(name) {
            handle.disable_export(export);
        }
        self.registry.disable_export(name, export);
    }

    /// Forget this thread's handle for `name` after merging what it buffered.
    ///
    /// Returns `true` if a handle was cached. The shared stat is untouched
    /// apart from the merge.
    pub fn clear_stat(&mut self, name: &str) -> bool {
        match self.handles.remove(name) {
            Some(handle) => {
                handle.merge(self.registry.now());
                true
            }
            None => false,
        }
    }

    /// Forget every handle after merging what they buffered.
    pub fn reset_all_data(&mut self) {
        self.flush();
        self.handles.clear();
        self.counters.clear();
        self.histograms.clear();
    }

    /// Merge every buffered value into the shared stats.
    ///
    /// Returns the number of handles that held values.
    pub fn flush(&mut self) -> usize {
        let now = self.registry.now();
        let stats = self.handles.values().filter(|h| h.merge(now)).count();
        let histograms = self.histograms.values().filter(|h| h.merge(now)).count();
        let counters = self.counters.values().filter(|h| h.merge()).count();
        stats.saturating_add(histograms).saturating_add(counters)
    }
}

impl Drop for ThreadLocalCache {
    fn drop(&mut self) {
        let handles = self.len();
        let merged = self.flush();
        tracing::debug!(
            handles = handles,
            merged = merged,
            "Thread-local stats cache torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RegistryConfig;
    use crate::registry::Window;
    use crate::RegistryResult;
    use rollstat_timeseries::HistogramConfig;

    const ALLTIME: usize = 2;

    fn registry() -> RegistryResult<Arc<NamedRegistry>> {
        let clock = Arc::new(ManualClock::new(TimePoint::from_secs(50)));
        Ok(Arc::new(NamedRegistry::with_clock(
            RegistryConfig::default(),
            clock,
        )?))
    }

    #[test]
    fn test_updates_stay_local_until_merged() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value("hits", 3);
        cache.add_stat_value("hits", 4);

        let stat = registry.get("hits");
        assert!(stat.is_some());
        let raw = stat.map_or(-1, |s| s.with_locked(|agg| agg.sum(ALLTIME)));
        assert_eq!(raw, 0);
        assert_eq!(cache.handle("hits").map(StatHandle::pending), Some((7, 2)));

        assert_eq!(cache.flush(), 1);
        assert_eq!(registry.get_sum("hits", Window::Level(ALLTIME)), 7);
        assert_eq!(registry.get_count("hits", Window::Level(ALLTIME)), 2);
        Ok(())
    }

    #[test]
    fn test_registry_read_merges_buffers() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value_aggregated("bytes", 1000, 4);
        assert_eq!(registry.get_avg::<i64>("bytes", Window::Level(ALLTIME)), 250);
        assert_eq!(cache.handle("bytes").map(StatHandle::pending), Some((0, 0)));
        Ok(())
    }

    #[test]
    fn test_export_enable_is_monotonic() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value_with_export("req", 1, ExportType::Sum);
        cache.add_stat_value_with_export("req", 1, ExportType::Rate);
        cache.add_stat_value("req", 1);

        let exports = registry.list_enabled_exports("req");
        assert!(exports.contains(ExportType::Sum));
        assert!(exports.contains(ExportType::Rate));

        cache.clear_stat_export("req", ExportType::Sum);
        assert!(!registry.list_enabled_exports("req").contains(ExportType::Sum));
        assert!(
            cache
                .handle("req")
                .is_some_and(|h| !h.exports().contains(ExportType::Sum))
        );
        Ok(())
    }

    #[test]
    fn test_clear_stat_merges_and_forgets() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value("a", 5);
        assert!(cache.clear_stat("a"));
        assert!(!cache.clear_stat("a"));
        assert!(cache.is_empty());
        assert!(registry.contains("a"));
        assert_eq!(registry.get_sum("a", Window::Level(ALLTIME)), 5);
        Ok(())
    }

    #[test]
    fn test_drop_merges_buffers() -> RegistryResult<()> {
        let registry = registry()?;
        {
            let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
            cache.add_stat_value("x", 2);
            cache.add_stat_value("y", 3);
        }
        let stat = registry.get("x");
        assert_eq!(stat.map(|s| s.attached_buffers()), Some(0));
        assert_eq!(registry.get_sum("x", Window::Level(ALLTIME)), 2);
        assert_eq!(registry.get_sum("y", Window::Level(ALLTIME)), 3);
        Ok(())
    }

    #[test]
    fn test_counter_increments_stay_local_until_merged() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.increment_counter("retries", 2);
        cache.increment_counter("retries", 3);

        let counter = registry.flat_counter("retries");
        assert_eq!(counter.as_ref().map(|c| c.value()), Some(0));
        assert_eq!(cache.pending_increments("retries"), Some(5));

        assert_eq!(registry.get_counter("retries"), 5);
        assert_eq!(cache.pending_increments("retries"), Some(0));
        assert_eq!(cache.flush(), 0);
        Ok(())
    }

    #[test]
    fn test_histogram_values_need_a_definition() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        assert!(!cache.add_histogram_value("latency", 12));
        assert!(cache.is_empty());

        registry.add_histogram("latency", &HistogramConfig::new(10, 0, 100))?;
        assert!(cache.add_histogram_value("latency", 12));
        assert!(cache.add_histogram_value("latency", 250));
        assert_eq!(cache.len(), 1);

        let hist = registry.histogram("latency");
        let raw = hist.map_or(0, |h| h.with_locked(|hist| hist.count(hist.all_time_index())));
        assert_eq!(raw, 0);

        assert_eq!(cache.flush(), 1);
        assert_eq!(registry.get_histogram_count("latency", Window::Level(3)), 2);
        assert_eq!(registry.get_percentile_bucket_min("latency", 100, Window::Level(3)), 100);
        Ok(())
    }

    #[test]
    fn test_reset_all_data_keeps_registry_entries() -> RegistryResult<()> {
        let registry = registry()?;
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value("p", 1);
        cache.add_stat_value("q", 1);
        cache.reset_all_data();
        assert!(cache.is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_sum("p", Window::Level(ALLTIME)), 1);
        Ok(())
    }
}
