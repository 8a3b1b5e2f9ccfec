//! Several levels kept time-consistent under one flush.
//!
//! [`MultiLevelAggregate`] owns the configured bucketed levels plus the
//! all-time level, which always sits at index `num_levels() - 1`. Every
//! add and flush is applied to all levels with the same timestamp; there is
//! no other coupling between levels.
//!
//! The aggregate is not thread-safe on its own. The registry wraps it in a
//! per-name lock.

use crate::config::LevelConfig;
use crate::error::TimeseriesResult;
use crate::level::Level;
use crate::time::{StatNumber, TimePoint};

/// Multi-resolution rolling aggregate with an all-time total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLevelAggregate {
    levels: Vec<Level>,
    all_time: Level,
    dropped_samples: u64,
}

impl Default for MultiLevelAggregate {
    /// Minute and hour levels plus all-time.
    fn default() -> Self {
        Self::with_levels(vec![Level::bucketed(1, 60), Level::bucketed(60, 60)])
    }
}

impl MultiLevelAggregate {
    /// Build an aggregate from a level configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: &LevelConfig) -> TimeseriesResult<Self> {
        config.validate()?;
        let levels = config
            .levels
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.width_secs(index)
                    .map(|width| Level::bucketed(width, spec.bucket_count))
            })
            .collect::<TimeseriesResult<Vec<_>>>()?;
        Ok(Self::with_levels(levels))
    }

    /// Build an aggregate from already-constructed bucketed levels, ordered
    /// finest first. The all-time level is appended automatically.
    #[must_use]
    pub fn with_levels(levels: Vec<Level>) -> Self {
        let levels = levels.into_iter().filter(|l| !l.is_all_time()).collect();
        Self {
            levels,
            all_time: Level::all_time(),
            dropped_samples: 0,
        }
    }

    /// Number of levels, including all-time.
    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.levels.len().saturating_add(1)
    }

    /// Index of the all-time level.
    #[must_use]
    pub fn all_time_index(&self) -> usize {
        self.levels.len()
    }

    /// Level at `index`, if it exists.
    #[must_use]
    pub fn level(&self, index: usize) -> Option<&Level> {
        if index == self.levels.len() {
            return Some(&self.all_time);
        }
        self.levels.get(index)
    }

    /// Iterate over every level, finest first, ending with all-time.
    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter().chain(core::iter::once(&self.all_time))
    }

    /// The all-time level.
    #[must_use]
    pub const fn all_time(&self) -> &Level {
        &self.all_time
    }

    /// Latest timestamp seen by any add or flush.
    #[must_use]
    pub const fn latest_time(&self) -> TimePoint {
        self.all_time.latest_time()
    }

    /// Number of per-level drops caused by timestamps older than a level's
    /// retained window.
    #[must_use]
    pub const fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Record one value at `now` in every level.
    pub fn add_value(&mut self, now: TimePoint, value: i64) {
        self.add_value_aggregated(now, value, 1);
    }

    /// Record `count` samples summing to `sum` at `now` in every level.
    ///
    /// The all-time level always accepts the batch. A bucketed level drops
    /// it if `now` predates its retained window; such drops are counted and
    /// logged, never reported to the caller.
    pub fn add_value_aggregated(&mut self, now: TimePoint, sum: i64, count: u64) {
        for level in &mut self.levels {
            if !level.add_value_aggregated(now, sum, count) {
                self.dropped_samples = self.dropped_samples.saturating_add(1);
                tracing::debug!(
                    time = now.as_secs(),
                    latest = level.latest_time().as_secs(),
                    coverage_secs = level.duration_secs(),
                    "Dropped out-of-order sample older than level window"
                );
            }
        }
        self.all_time.add_value_aggregated(now, sum, count);
    }

    /// Advance every level to `now` without recording a value.
    pub fn flush(&mut self, now: TimePoint) {
        for level in &mut self.levels {
            level.flush(now);
        }
        self.all_time.flush(now);
    }

    /// Reset every level and the all-time totals.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
        self.all_time.clear();
        self.dropped_samples = 0;
    }

    /// Sum of the level at `index`, zero if out of range.
    #[must_use]
    pub fn sum(&self, index: usize) -> i64 {
        self.level(index).map_or(0, Level::sum)
    }

    /// Sample count of the level at `index`, zero if out of range.
    #[must_use]
    pub fn count(&self, index: usize) -> u64 {
        self.level(index).map_or(0, Level::count)
    }

    /// Average of the level at `index`, zero if out of range.
    #[must_use]
    pub fn avg<R: StatNumber>(&self, index: usize) -> R {
        self.level(index).map_or(R::ZERO, Level::avg)
    }

    /// Rate per second of the level at `index`, zero if out of range.
    #[must_use]
    pub fn rate<R: StatNumber>(&self, index: usize) -> R {
        self.level(index).map_or(R::ZERO, Level::rate)
    }

    /// Samples per second of the level at `index`, zero if out of range.
    #[must_use]
    pub fn count_rate<R: StatNumber>(&self, index: usize) -> R {
        self.level(index).map_or(R::ZERO, Level::count_rate)
    }

    /// Elapsed seconds of the level at `index`, zero if out of range.
    #[must_use]
    pub fn elapsed(&self, index: usize) -> i64 {
        self.level(index).map_or(0, Level::elapsed)
    }

    /// Finest level whose ring reaches back to `start`, falling back to the
    /// all-time level.
    ///
    /// A level qualifies as soon as its full coverage would include `start`,
    /// even if it has not yet accumulated that much history.
    #[must_use]
    pub fn level_for(&self, start: TimePoint) -> &Level {
        self.levels
            .iter()
            .find(|level| level.earliest_time_non_empty() <= start)
            .unwrap_or(&self.all_time)
    }

    /// Interpolated sum over `[start, end)`.
    #[must_use]
    pub fn sum_between(&self, start: TimePoint, end: TimePoint) -> i64 {
        self.level_for(start).sum_between(start, end)
    }

    /// Interpolated sample count over `[start, end)`.
    #[must_use]
    pub fn count_between(&self, start: TimePoint, end: TimePoint) -> u64 {
        self.level_for(start).count_between(start, end)
    }

    /// Average over `[start, end)`.
    #[must_use]
    pub fn avg_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        self.level_for(start).avg_between(start, end)
    }

    /// Rate per second over `[start, end)`.
    #[must_use]
    pub fn rate_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        self.level_for(start).rate_between(start, end)
    }

    /// Samples per second over `[start, end)`.
    #[must_use]
    pub fn count_rate_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        self.level_for(start).count_rate_between(start, end)
    }
}
