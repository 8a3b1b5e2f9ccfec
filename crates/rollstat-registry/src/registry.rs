//! Name to stat mapping shared by every thread.
//!
//! The registry keeps three independent namespaces: rolling stats
//! ([`GuardedAggregate`]), histograms ([`GuardedHistogram`]) and flat
//! counters ([`FlatCounter`]). Each only grows: once a name has been
//! resolved, the same object is returned for it for the lifetime of the
//! registry. There is no eviction, so callers must keep names to a bounded
//! set; feeding untrusted input into stat names grows memory without limit.
//!
//! Lookups of known names take the map's read lock only. Creating a name
//! builds the object outside any lock and installs it under the write lock;
//! if another thread installed the same name first, the fresh one is
//! dropped and the winner is returned to both.

use parking_lot::RwLock;
use rollstat_timeseries::{
    HistogramConfig, Level, LevelConfig, MultiLevelAggregate, StatNumber, TimePoint,
    TimeseriesHistogram,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::counter::FlatCounter;
use crate::error::{RegistryError, RegistryResult};
use crate::export::{ExportSet, ExportType};
use crate::guarded::GuardedAggregate;
use crate::histogram::GuardedHistogram;

type NameMap<T> = RwLock<HashMap<String, Arc<T>>>;

/// Which part of a stat's history a read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// A whole level, by index. The all-time level is the last one.
    Level(usize),
    /// The half-open interval `[start, end)`, interpolated at bucket edges.
    Interval {
        /// Inclusive start.
        start: TimePoint,
        /// Exclusive end.
        end: TimePoint,
    },
}

impl Window {
    /// Interval window over `[start, end)`.
    #[must_use]
    pub const fn between(start: TimePoint, end: TimePoint) -> Self {
        Self::Interval { start, end }
    }
}

impl From<usize> for Window {
    fn from(level: usize) -> Self {
        Self::Level(level)
    }
}

/// Process- or component-wide map from name to stat, histogram and counter.
#[derive(Debug)]
pub struct NamedRegistry {
    config: RegistryConfig,
    default_exports: ExportSet,
    clock: Arc<dyn Clock>,
    stats: NameMap<GuardedAggregate>,
    histograms: NameMap<GuardedHistogram>,
    flat_counters: NameMap<FlatCounter>,
    created: AtomicU64,
    growth_warned: AtomicBool,
}

impl Default for NamedRegistry {
    fn default() -> Self {
        Self::build(RegistryConfig::default(), Arc::new(SystemClock))
    }
}

impl NamedRegistry {
    /// Create a registry reading wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_exports: config.default_export_set(),
            config,
            clock,
            stats: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            flat_counters: RwLock::new(HashMap::new()),
            created: AtomicU64::new(0),
            growth_warned: AtomicBool::new(false),
        }
    }

    /// Registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current stats-clock time.
    #[must_use]
    pub fn now(&self) -> TimePoint {
        self.clock.now()
    }

    /// Look up `name`, creating it with the default levels if needed.
    pub fn resolve(&self, name: &str) -> Arc<GuardedAggregate> {
        if let Some(stat) = self.get(name) {
            return stat;
        }
        let aggregate = MultiLevelAggregate::new(&self.config.default_levels).unwrap_or_default();
        self.install(name, aggregate)
    }

    /// Look up `name`, creating it with `levels` if needed.
    ///
    /// The level configuration only applies when this call creates the
    /// stat; an existing stat keeps its levels.
    ///
    /// # Errors
    ///
    /// Returns an error if `levels` is invalid.
    pub fn resolve_with(
        &self,
        name: &str,
        levels: &LevelConfig,
    ) -> RegistryResult<Arc<GuardedAggregate>> {
        if let Some(stat) = self.get(name) {
            return Ok(stat);
        }
        let aggregate = MultiLevelAggregate::new(levels)?;
        Ok(self.install(name, aggregate))
    }

    fn install(&self, name: &str, aggregate: MultiLevelAggregate) -> Arc<GuardedAggregate> {
        let fresh = Arc::new(GuardedAggregate::new(name, aggregate, self.default_exports));
        let (stat, installed) = self.install_into(&self.stats, name, fresh);
        if installed {
            self.created.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                stat = name,
                levels = stat.with_locked(|agg| agg.num_levels()),
                "Registered new stat"
            );
        }
        stat
    }

    /// Insert `fresh` under `name` unless another thread got there first.
    /// Returns the winner and whether it is `fresh`.
    fn install_into<T>(&self, map: &NameMap<T>, name: &str, fresh: Arc<T>) -> (Arc<T>, bool) {
        let (winner, len, installed) = {
            let mut entries = map.write();
            match entries.get(name) {
                Some(existing) => (Arc::clone(existing), entries.len(), false),
                None => {
                    entries.insert(name.to_owned(), Arc::clone(&fresh));
                    (fresh, entries.len(), true)
                }
            }
        };
        if installed {
            self.warn_on_growth(len);
        }
        (winner, installed)
    }

    fn warn_on_growth(&self, len: usize) {
        let threshold = self.config.name_warning_threshold;
        if threshold > 0 && len > threshold && !self.growth_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                names = len,
                threshold = threshold,
                "Stat registry keeps growing; names are never evicted"
            );
        }
    }

    /// Existing aggregate for `name`, without creating it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<GuardedAggregate>> {
        self.stats.read().get(name).cloned()
    }

    /// Whether `name` has been registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stats.read().contains_key(name)
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    /// Whether no name has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.read().is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stats.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of aggregates ever installed. Losing sides of a creation race
    /// are not counted.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Record one value for `name` at `now` under the stat's lock.
    pub fn add_value(&self, name: &str, now: TimePoint, value: i64) {
        self.resolve(name).add_value(now, value);
    }

    /// Record a pre-aggregated batch for `name` at `now`.
    pub fn add_value_aggregated(&self, name: &str, now: TimePoint, sum: i64, count: u64) {
        self.resolve(name).add_value_aggregated(now, sum, count);
    }

    /// Sum over `window`, zero for an unknown name.
    #[must_use]
    pub fn get_sum(&self, name: &str, window: Window) -> i64 {
        self.read(name, |agg| match window {
            Window::Level(level) => agg.sum(level),
            Window::Interval { start, end } => agg.sum_between(start, end),
        })
        .unwrap_or(0)
    }

    /// Sample count over `window`, zero for an unknown name.
    #[must_use]
    pub fn get_count(&self, name: &str, window: Window) -> u64 {
        self.read(name, |agg| match window {
            Window::Level(level) => agg.count(level),
            Window::Interval { start, end } => agg.count_between(start, end),
        })
        .unwrap_or(0)
    }

    /// Average over `window`, zero for an unknown name.
    #[must_use]
    pub fn get_avg<R: StatNumber>(&self, name: &str, window: Window) -> R {
        self.read(name, |agg| match window {
            Window::Level(level) => agg.avg(level),
            Window::Interval { start, end } => agg.avg_between(start, end),
        })
        .unwrap_or(R::ZERO)
    }

    /// Rate per second over `window`, zero for an unknown name.
    #[must_use]
    pub fn get_rate<R: StatNumber>(&self, name: &str, window: Window) -> R {
        self.read(name, |agg| match window {
            Window::Level(level) => agg.rate(level),
            Window::Interval { start, end } => agg.rate_between(start, end),
        })
        .unwrap_or(R::ZERO)
    }

    fn read<R>(&self, name: &str, f: impl FnOnce(&MultiLevelAggregate) -> R) -> Option<R> {
        let stat = self.get(name)?;
        Some(stat.read_at(self.now(), f))
    }

    /// Look up the flat counter `name`, creating it at zero if needed.
    pub fn resolve_counter(&self, name: &str) -> Arc<FlatCounter> {
        if let Some(counter) = self.flat_counter(name) {
            return counter;
        }
        let (counter, installed) =
            self.install_into(&self.flat_counters, name, Arc::new(FlatCounter::new(name)));
        if installed {
            tracing::debug!(counter = name, "Registered new flat counter");
        }
        counter
    }

    /// Existing flat counter `name`, without creating it.
    #[must_use]
    pub fn flat_counter(&self, name: &str) -> Option<Arc<FlatCounter>> {
        self.flat_counters.read().get(name).cloned()
    }

    /// Add `amount` to the flat counter `name`, creating it if needed.
    pub fn increment_counter(&self, name: &str, amount: i64) {
        self.resolve_counter(name).increment(amount);
    }

    /// Value of the flat counter `name` with buffered increments merged,
    /// zero for an unknown name.
    #[must_use]
    pub fn get_counter(&self, name: &str) -> i64 {
        self.flat_counter(name).map_or(0, |counter| counter.read())
    }

    /// Define the histogram `name`.
    ///
    /// The first definition wins: if `name` already exists it is returned
    /// unchanged, and a differing geometry is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn add_histogram(
        &self,
        name: &str,
        config: &HistogramConfig,
    ) -> RegistryResult<Arc<GuardedHistogram>> {
        let histogram = match self.histogram(name) {
            Some(existing) => existing,
            None => {
                let fresh = Arc::new(GuardedHistogram::new(
                    name,
                    TimeseriesHistogram::new(config)?,
                ));
                let (histogram, installed) = self.install_into(&self.histograms, name, fresh);
                if installed {
                    tracing::debug!(
                        histogram = name,
                        buckets = histogram.geometry().num_buckets(),
                        "Registered new histogram"
                    );
                    return Ok(histogram);
                }
                histogram
            }
        };
        if histogram.geometry() != config.geometry {
            tracing::warn!(
                histogram = name,
                existing = ?histogram.geometry(),
                requested = ?config.geometry,
                "Histogram already defined with a different geometry; keeping the first"
            );
        }
        Ok(histogram)
    }

    /// Existing histogram `name`.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<Arc<GuardedHistogram>> {
        self.histograms.read().get(name).cloned()
    }

    /// Record `value` into histogram `name` at `now`.
    ///
    /// Histograms must be defined with [`add_histogram`](Self::add_histogram)
    /// first. Returns `false`, recording nothing, for an unknown name.
    pub fn add_histogram_value(&self, name: &str, now: TimePoint, value: i64) -> bool {
        match self.histogram(name) {
            Some(histogram) => {
                histogram.add_value(now, value);
                true
            }
            None => false,
        }
    }

    /// Publish the `pct`th percentile of histogram `name` as a counter.
    /// Returns `true` if it was not already published.
    ///
    /// # Errors
    ///
    /// Returns an error if no histogram is named `name` or `pct` exceeds
    /// 100.
    pub fn export_percentile(&self, name: &str, pct: u8) -> RegistryResult<bool> {
        self.histogram(name)
            .ok_or_else(|| RegistryError::unknown_histogram(name))?
            .export_percentile(pct)
    }

    /// Stop publishing the `pct`th percentile of histogram `name`.
    pub fn unexport_percentile(&self, name: &str, pct: u8) -> bool {
        self.histogram(name)
            .is_some_and(|histogram| histogram.unexport_percentile(pct))
    }

    /// Enable `export` over the totals of histogram `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no histogram is named `name`.
    pub fn export_histogram(&self, name: &str, export: ExportType) -> RegistryResult<bool> {
        self.histogram(name)
            .map(|histogram| histogram.enable_export(export))
            .ok_or_else(|| RegistryError::unknown_histogram(name))
    }

    /// Estimated `pct`th percentile of histogram `name` over `window`, zero
    /// for an unknown name.
    #[must_use]
    pub fn get_percentile(&self, name: &str, pct: u8, window: Window) -> i64 {
        self.read_histogram(name, |hist| match window {
            Window::Level(level) => hist.percentile(pct, level),
            Window::Interval { start, end } => hist.percentile_between(pct, start, end),
        })
        .unwrap_or(0)
    }

    /// Lower bound of the bucket holding the `pct`th percentile of
    /// histogram `name`, zero for an unknown name.
    #[must_use]
    pub fn get_percentile_bucket_min(&self, name: &str, pct: u8, window: Window) -> i64 {
        self.read_histogram(name, |hist| match window {
            Window::Level(level) => hist.percentile_bucket_min(pct, level),
            Window::Interval { start, end } => hist.percentile_bucket_min_between(pct, start, end),
        })
        .unwrap_or(0)
    }

    /// Samples recorded into histogram `name` over `window`.
    #[must_use]
    pub fn get_histogram_count(&self, name: &str, window: Window) -> u64 {
        self.read_histogram(name, |hist| match window {
            Window::Level(level) => hist.count(level),
            Window::Interval { start, end } => hist.count_between(start, end),
        })
        .unwrap_or(0)
    }

    fn read_histogram<R>(
        &self,
        name: &str,
        f: impl FnOnce(&TimeseriesHistogram) -> R,
    ) -> Option<R> {
        let histogram = self.histogram(name)?;
        Some(histogram.read_at(self.now(), f))
    }

    /// Enable `export` for `name`, creating the stat if needed.
    pub fn enable_export(&self, name: &str, export: ExportType) {
        self.resolve(name).enable_export(export);
    }

    /// Disable `export` for `name`. Unknown names are ignored.
    pub fn disable_export(&self, name: &str, export: ExportType) {
        if let Some(stat) = self.get(name) {
            stat.disable_export(export);
        }
    }

    /// Export types enabled for `name`, empty for an unknown name.
    #[must_use]
    pub fn list_enabled_exports(&self, name: &str) -> ExportSet {
        self.get(name).map_or(ExportSet::EMPTY, |stat| stat.exports())
    }

    /// Reset whatever is registered under `name` without unregistering
    /// it: every level of a stat, every bucket of a histogram, and a flat
    /// counter's total.
    pub fn clear(&self, name: &str) {
        if let Some(stat) = self.get(name) {
            stat.clear();
        }
        if let Some(histogram) = self.histogram(name) {
            histogram.clear();
        }
        if let Some(counter) = self.flat_counter(name) {
            counter.reset();
        }
    }

    /// Fold every outstanding thread-local buffer into its stat, histogram
    /// or counter.
    ///
    /// Returns the number of buffers that held values.
    pub fn aggregate(&self) -> usize {
        let now = self.now();
        let stats = snapshot(&self.stats);
        let histograms = snapshot(&self.histograms);
        let counters = snapshot(&self.flat_counters);
        let buffers = stats
            .iter()
            .map(|stat| stat.merge_locals(now))
            .chain(histograms.iter().map(|h| h.merge_locals(now)))
            .chain(counters.iter().map(|c| c.merge_locals()))
            .fold(0_usize, usize::saturating_add);
        tracing::trace!(
            stats = stats.len(),
            histograms = histograms.len(),
            counters = counters.len(),
            buffers = buffers,
            "Merged thread-local buffers"
        );
        buffers
    }

    /// Every exported counter, keyed by counter name.
    ///
    /// Each enabled export type of each stat or histogram yields one
    /// counter per level: `"{name}.{suffix}.{coverage_secs}"` for bucketed
    /// levels and `"{name}.{suffix}"` for the all-time level. Each exported
    /// percentile of a histogram does the same with suffix `p{pct}`. Flat
    /// counters appear under their bare name.
    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, i64> {
        let now = self.now();
        let mut counters = BTreeMap::new();
        for stat in snapshot(&self.stats) {
            export_stat(&stat, now, &mut counters);
        }
        for histogram in snapshot(&self.histograms) {
            export_histogram(&histogram, now, &mut counters);
        }
        for counter in snapshot(&self.flat_counters) {
            counters.insert(counter.name().to_owned(), counter.read());
        }
        counters
    }

    /// Value of one exported counter, if it exists.
    #[must_use]
    pub fn counter(&self, counter: &str) -> Option<i64> {
        if let Some(flat) = self.flat_counter(counter) {
            return Some(flat.read());
        }
        let owns = |name: &str| {
            counter
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('.'))
        };
        let now = self.now();
        let mut candidates = BTreeMap::new();
        for stat in snapshot(&self.stats) {
            if owns(stat.name()) {
                export_stat(&stat, now, &mut candidates);
            }
        }
        for histogram in snapshot(&self.histograms) {
            if owns(histogram.name()) {
                export_histogram(&histogram, now, &mut candidates);
            }
        }
        candidates.get(counter).copied()
    }
}

fn snapshot<T>(map: &NameMap<T>) -> Vec<Arc<T>> {
    map.read().values().cloned().collect()
}

fn counter_key(name: &str, suffix: &str, level: &Level) -> String {
    if level.is_all_time() {
        format!("{name}.{suffix}")
    } else {
        format!("{name}.{suffix}.{}", level.duration_secs())
    }
}

fn export_stat(stat: &GuardedAggregate, now: TimePoint, out: &mut BTreeMap<String, i64>) {
    let exports = stat.exports();
    if exports.is_empty() {
        return;
    }
    stat.read_at(now, |agg| {
        for export in exports.iter() {
            for (index, level) in agg.levels().enumerate() {
                out.insert(
                    counter_key(stat.name(), export.suffix(), level),
                    export.project(agg, index),
                );
            }
        }
    });
}

fn export_histogram(
    histogram: &GuardedHistogram,
    now: TimePoint,
    out: &mut BTreeMap<String, i64>,
) {
    let exports = histogram.exports();
    let percentiles = histogram.exported_percentiles();
    if exports.is_empty() && percentiles.is_empty() {
        return;
    }
    histogram.read_at(now, |hist| {
        for (index, level) in hist.levels().enumerate() {
            for export in exports.iter() {
                let value =
                    export.project_totals(hist.sum(index), hist.count(index), hist.elapsed(index));
                out.insert(counter_key(histogram.name(), export.suffix(), level), value);
            }
            for pct in &percentiles {
                out.insert(
                    counter_key(histogram.name(), &format!("p{pct}"), level),
                    hist.percentile(*pct, index),
                );
            }
        }
    });
}
