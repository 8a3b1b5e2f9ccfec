//! Process-wide registry and per-thread caches.
//!
//! The global registry is created on first use and lives until the process
//! exits. Each thread gets its own [`ThreadLocalCache`] the first time it
//! records a stat; the cache merges whatever it still buffers when the
//! thread exits.
//!
//! If the thread's cache is unavailable (already borrowed by an outer call
//! on the same thread, or destroyed during thread teardown), updates go
//! straight to the registry under the stat's lock instead.

use std::cell::RefCell;
use std::sync::{Arc, LazyLock};

use crate::aggregator::Aggregator;
use crate::error::RegistryResult;
use crate::export::ExportType;
use crate::local::ThreadLocalCache;
use crate::registry::NamedRegistry;

static REGISTRY: LazyLock<Arc<NamedRegistry>> =
    LazyLock::new(|| Arc::new(NamedRegistry::default()));

thread_local! {
    static CACHE: RefCell<Option<ThreadLocalCache>> = const { RefCell::new(None) };
}

/// The process-wide registry.
#[must_use]
pub fn registry() -> &'static Arc<NamedRegistry> {
    &REGISTRY
}

fn with_cache<R>(
    fast: impl FnOnce(&mut ThreadLocalCache) -> R,
    slow: impl FnOnce(&NamedRegistry) -> R,
) -> R {
    let fast_result = CACHE
        .try_with(|cell| {
            let mut slot = cell.try_borrow_mut().ok()?;
            let cache =
                slot.get_or_insert_with(|| ThreadLocalCache::new(Arc::clone(registry())));
            Some(fast(cache))
        })
        .ok()
        .flatten();
    match fast_result {
        Some(result) => result,
        None => slow(registry()),
    }
}

/// Record one value for `name` on this thread.
pub fn add_stat_value(name: &str, value: i64) {
    with_cache(
        |cache| cache.add_stat_value(name, value),
        |registry| registry.add_value(name, registry.now(), value),
    );
}

/// Record `count` samples summing to `sum` for `name` on this thread.
pub fn add_stat_value_aggregated(name: &str, sum: i64, count: u64) {
    with_cache(
        |cache| cache.add_stat_value_aggregated(name, sum, count),
        |registry| registry.add_value_aggregated(name, registry.now(), sum, count),
    );
}

/// Record one value for `name` and enable `export` for it.
pub fn add_stat_value_with_export(name: &str, value: i64, export: ExportType) {
    with_cache(
        |cache| cache.add_stat_value_with_export(name, value, export),
        |registry| {
            registry.add_value(name, registry.now(), value);
            registry.enable_export(name, export);
        },
    );
}

/// Add `amount` to the flat counter `name` on this thread.
pub fn increment_counter(name: &str, amount: i64) {
    with_cache(
        |cache| cache.increment_counter(name, amount),
        |registry| registry.increment_counter(name, amount),
    );
}

/// Record `value` into histogram `name` on this thread.
///
/// The histogram must already be defined on the global registry with
/// [`NamedRegistry::add_histogram`]. Returns `false`, recording nothing,
/// otherwise.
pub fn add_histogram_value(name: &str, value: i64) -> bool {
    with_cache(
        |cache| cache.add_histogram_value(name, value),
        |registry| registry.add_histogram_value(name, registry.now(), value),
    )
}

/// Disable `export` for `name`.
pub fn clear_stat_export(name: &str, export: ExportType) {
    with_cache(
        |cache| cache.clear_stat_export(name, export),
        |registry| registry.disable_export(name, export),
    );
}

/// Drop this thread's handle for `name`, merging what it buffered.
pub fn clear_stat(name: &str) {
    with_cache(
        |cache| {
            cache.clear_stat(name);
        },
        |_| (),
    );
}

/// Drop every handle cached on this thread, merging what they buffered.
pub fn reset_all_data() {
    with_cache(ThreadLocalCache::reset_all_data, |_| ());
}

/// Merge this thread's buffered values into the global registry.
///
/// Returns the number of stats that had buffered values.
pub fn flush_thread() -> usize {
    with_cache(ThreadLocalCache::flush, |_| 0)
}

/// Merge every thread's buffered values into the global registry.
pub fn aggregate() -> usize {
    registry().aggregate()
}

/// Start a background aggregator for the global registry.
///
/// # Errors
///
/// Returns an error if the aggregator thread cannot be spawned.
pub fn spawn_aggregator() -> RegistryResult<Aggregator> {
    Aggregator::spawn(Arc::clone(registry()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Window;
    use rollstat_timeseries::HistogramConfig;
    use std::thread;

    const ALLTIME: usize = 2;

    #[test]
    fn test_thread_exit_merges() {
        let name = "global.test_thread_exit_merges";
        let worker = thread::spawn(move || {
            for _ in 0..100 {
                add_stat_value(name, 2);
            }
        });
        assert!(worker.join().is_ok(), "worker thread panicked");
        let stat = registry().get(name);
        let merged = stat.map_or(0, |s| s.with_locked(|agg| agg.sum(ALLTIME)));
        assert_eq!(merged, 200);
    }

    #[test]
    fn test_flush_thread_and_exports() {
        let name = "global.test_flush_thread_and_exports";
        add_stat_value_with_export(name, 5, ExportType::Count);
        add_stat_value_aggregated(name, 15, 3);
        assert_eq!(flush_thread(), 1);
        assert_eq!(registry().get_count(name, Window::Level(ALLTIME)), 4);
        assert!(registry().list_enabled_exports(name).contains(ExportType::Count));

        clear_stat_export(name, ExportType::Count);
        assert!(registry().list_enabled_exports(name).is_empty());

        clear_stat(name);
        reset_all_data();
        assert!(registry().contains(name));
    }

    #[test]
    fn test_counters_and_histograms_merge_on_thread_exit() -> RegistryResult<()> {
        let counter = "global.test_counters_and_histograms.requests";
        let histogram = "global.test_counters_and_histograms.latency_ms";
        registry().add_histogram(histogram, &HistogramConfig::new(10, 0, 100))?;

        let worker = thread::spawn(move || {
            for value in 0..100 {
                increment_counter(counter, 1);
                add_histogram_value(histogram, value);
            }
            add_histogram_value("global.test_counters_and_histograms.undefined", 1)
        });
        let recorded_undefined = worker.join();
        assert!(
            matches!(recorded_undefined, Ok(false)),
            "worker panicked or recorded into an undefined histogram"
        );

        assert_eq!(registry().flat_counter(counter).map(|c| c.value()), Some(100));
        let all_time = Window::Level(3);
        assert_eq!(registry().get_histogram_count(histogram, all_time), 100);
        assert_eq!(registry().get_percentile(histogram, 50, all_time), 50);
        Ok(())
    }

    #[test]
    fn test_reentrant_use_falls_back_to_registry() {
        let name = "global.test_reentrant_use_falls_back_to_registry";
        CACHE.with(|cell| {
            let _outer = cell.borrow_mut();
            add_stat_value(name, 9);
        });
        let stat = registry().get(name);
        let direct = stat.map_or(0, |s| s.with_locked(|agg| agg.sum(ALLTIME)));
        assert_eq!(direct, 9);
    }
}
