//! Value histograms whose buckets each keep a rolling history.
//!
//! A [`TimeseriesHistogram`] splits `[min, max)` into equal-width value
//! buckets, plus one underflow bucket below `min` and one overflow bucket
//! at or above `max`. Every value bucket is a [`MultiLevelAggregate`], so
//! each time level can answer "what did the distribution look like over
//! the last N seconds" and estimate percentiles from it.
//!
//! ```rust
//! use rollstat_timeseries::{HistogramConfig, TimePoint, TimeseriesHistogram};
//!
//! let mut hist = TimeseriesHistogram::new(&HistogramConfig::new(10, 0, 100))?;
//! for value in 0..100 {
//!     hist.add_value(TimePoint::ZERO, value);
//! }
//! let all_time = hist.all_time_index();
//! assert_eq!(hist.percentile_bucket_min(50, all_time), 40);
//! assert_eq!(hist.percentile(50, all_time), 50);
//! # Ok::<(), rollstat_timeseries::TimeseriesError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::aggregate::MultiLevelAggregate;
use crate::bucket::{Bucket, count_as_i64};
use crate::config::LevelConfig;
use crate::error::{TimeseriesError, TimeseriesResult};
use crate::level::Level;
use crate::time::{StatNumber, TimePoint};

/// Most in-range value buckets a single histogram may have.
pub const MAX_VALUE_BUCKETS: usize = 4096;

/// Value range layout of a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistogramGeometry {
    /// Width of one in-range bucket.
    pub bucket_width: i64,
    /// Lower bound of the first in-range bucket.
    pub min: i64,
    /// Values at or above this land in the overflow bucket.
    pub max: i64,
}

impl HistogramGeometry {
    /// Create a geometry. Call [`validate`](Self::validate) before use.
    #[must_use]
    pub const fn new(bucket_width: i64, min: i64, max: i64) -> Self {
        Self {
            bucket_width,
            min,
            max,
        }
    }

    /// Validate the geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket width is not positive, `min` is not
    /// below `max`, or the range needs more than [`MAX_VALUE_BUCKETS`]
    /// buckets.
    pub fn validate(&self) -> TimeseriesResult<()> {
        if self.bucket_width <= 0 {
            return Err(TimeseriesError::invalid_histogram(
                "bucket_width must be greater than 0",
            ));
        }
        if self.min >= self.max {
            return Err(TimeseriesError::invalid_histogram(format!(
                "min ({}) must be below max ({})",
                self.min, self.max
            )));
        }
        let needed = self.in_range_buckets();
        if needed > MAX_VALUE_BUCKETS {
            return Err(TimeseriesError::invalid_histogram(format!(
                "range needs {needed} buckets, limit is {MAX_VALUE_BUCKETS}"
            )));
        }
        Ok(())
    }

    /// Number of buckets, including underflow and overflow.
    #[must_use]
    pub fn num_buckets(&self) -> usize {
        self.in_range_buckets().saturating_add(2)
    }

    /// Index of the bucket `value` falls into.
    #[must_use]
    pub fn bucket_index(&self, value: i64) -> usize {
        if value < self.min {
            return 0;
        }
        if value >= self.max {
            return self.overflow_index();
        }
        let offset = i128::from(value).saturating_sub(i128::from(self.min));
        let slot = offset
            .checked_div(i128::from(self.bucket_width.max(1)))
            .unwrap_or(0);
        usize::try_from(slot).map_or(self.overflow_index(), |slot| slot.saturating_add(1))
    }

    /// Smallest value that lands in bucket `index`.
    #[must_use]
    pub fn bucket_min(&self, index: usize) -> i64 {
        if index == 0 {
            return i64::MIN;
        }
        if index >= self.overflow_index() {
            return self.max;
        }
        self.edge(index.saturating_sub(1))
    }

    /// Exclusive upper bound of bucket `index`.
    ///
    /// The last in-range bucket is cut off at `max` when the range is not a
    /// whole number of widths.
    #[must_use]
    pub fn bucket_max(&self, index: usize) -> i64 {
        if index == 0 {
            return self.min;
        }
        if index >= self.overflow_index() {
            return i64::MAX;
        }
        self.edge(index).min(self.max)
    }

    fn overflow_index(&self) -> usize {
        self.num_buckets().saturating_sub(1)
    }

    fn in_range_buckets(&self) -> usize {
        let span = i128::from(self.max)
            .saturating_sub(i128::from(self.min))
            .max(0);
        let width = i128::from(self.bucket_width.max(1));
        let buckets = span
            .saturating_add(width.saturating_sub(1))
            .checked_div(width)
            .unwrap_or(0);
        usize::try_from(buckets).unwrap_or(usize::MAX)
    }

    fn edge(&self, slot: usize) -> i64 {
        let slot = i64::try_from(slot).unwrap_or(i64::MAX);
        self.min.saturating_add(slot.saturating_mul(self.bucket_width))
    }
}

/// Configuration of a [`TimeseriesHistogram`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Value range layout.
    #[serde(flatten)]
    pub geometry: HistogramGeometry,
    /// Time levels kept by every value bucket.
    #[serde(default = "LevelConfig::minute_ten_minute_hour")]
    pub levels: LevelConfig,
}

impl HistogramConfig {
    /// Histogram over `[min, max)` with minute, ten-minute and hour levels.
    #[must_use]
    pub fn new(bucket_width: i64, min: i64, max: i64) -> Self {
        Self {
            geometry: HistogramGeometry::new(bucket_width, min, max),
            levels: LevelConfig::minute_ten_minute_hour(),
        }
    }

    /// Replace the time levels.
    #[must_use]
    pub fn with_levels(mut self, levels: LevelConfig) -> Self {
        self.levels = levels;
        self
    }

    /// Validate geometry and levels.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is invalid.
    pub fn validate(&self) -> TimeseriesResult<()> {
        self.geometry.validate()?;
        self.levels.validate()
    }
}

/// Histogram of values with a multi-level rolling history per bucket.
///
/// Buckets only advance when a value lands in them, so call
/// [`update`](Self::update) with the current time before reading levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesHistogram {
    geometry: HistogramGeometry,
    buckets: Vec<MultiLevelAggregate>,
}

/// Where a percentile falls: a bucket and the cumulative counts around it.
#[derive(Debug, Clone, Copy)]
struct PercentileBucket {
    index: usize,
    below: u64,
    through: u64,
    total: u64,
}

/// Range the samples of one bucket are assumed to spread over.
enum Spread {
    Between(i64, i64),
    Fixed(i64),
}

impl TimeseriesHistogram {
    /// Build a histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: &HistogramConfig) -> TimeseriesResult<Self> {
        config.validate()?;
        let template = MultiLevelAggregate::new(&config.levels)?;
        Ok(Self {
            geometry: config.geometry,
            buckets: vec![template; config.geometry.num_buckets()],
        })
    }

    /// Value range layout.
    #[must_use]
    pub const fn geometry(&self) -> HistogramGeometry {
        self.geometry
    }

    /// Number of value buckets, including underflow and overflow.
    #[must_use]
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Value bucket at `index`.
    #[must_use]
    pub fn bucket(&self, index: usize) -> Option<&MultiLevelAggregate> {
        self.buckets.get(index)
    }

    /// Number of time levels, including all-time.
    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.buckets
            .first()
            .map_or(1, MultiLevelAggregate::num_levels)
    }

    /// Index of the all-time level.
    #[must_use]
    pub fn all_time_index(&self) -> usize {
        self.num_levels().saturating_sub(1)
    }

    /// The time levels of the first bucket; every bucket shares this layout.
    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.buckets
            .first()
            .into_iter()
            .flat_map(MultiLevelAggregate::levels)
    }

    /// Record one value at `now`.
    pub fn add_value(&mut self, now: TimePoint, value: i64) {
        self.add_value_times(now, value, 1);
    }

    /// Record `value` seen `times` times at `now`.
    pub fn add_value_times(&mut self, now: TimePoint, value: i64, times: u64) {
        let index = self.geometry.bucket_index(value);
        if let Some(bucket) = self.buckets.get_mut(index) {
            bucket.add_value_aggregated(now, value.saturating_mul(count_as_i64(times)), times);
        }
    }

    /// Fold one pre-aggregated batch per value bucket in at `now`.
    ///
    /// `batches` is indexed like the histogram's buckets. Empty batches are
    /// skipped and extra entries ignored.
    pub fn add_bucket_values(&mut self, now: TimePoint, batches: &[Bucket]) {
        for (bucket, batch) in self.buckets.iter_mut().zip(batches) {
            if !batch.is_empty() {
                bucket.add_value_aggregated(now, batch.sum, batch.count);
            }
        }
    }

    /// Advance every bucket to `now`.
    pub fn update(&mut self, now: TimePoint) {
        for bucket in &mut self.buckets {
            bucket.flush(now);
        }
    }

    /// Reset every bucket.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Samples at `level` across all buckets.
    #[must_use]
    pub fn count(&self, level: usize) -> u64 {
        self.buckets
            .iter()
            .fold(0, |acc, b| acc.saturating_add(b.count(level)))
    }

    /// Sum at `level` across all buckets.
    #[must_use]
    pub fn sum(&self, level: usize) -> i64 {
        self.buckets
            .iter()
            .fold(0, |acc, b| acc.saturating_add(b.sum(level)))
    }

    /// Average sample at `level`.
    #[must_use]
    pub fn avg<R: StatNumber>(&self, level: usize) -> R {
        R::ratio(self.sum(level), count_as_i64(self.count(level)))
    }

    /// Sum per second at `level`, over the longest elapsed time of any bucket.
    #[must_use]
    pub fn rate<R: StatNumber>(&self, level: usize) -> R {
        R::ratio(self.sum(level), self.elapsed(level))
    }

    /// Longest elapsed time of any bucket at `level`.
    #[must_use]
    pub fn elapsed(&self, level: usize) -> i64 {
        self.buckets
            .iter()
            .map(|b| b.elapsed(level))
            .max()
            .unwrap_or(0)
    }

    /// Interpolated sample count over `[start, end)`.
    #[must_use]
    pub fn count_between(&self, start: TimePoint, end: TimePoint) -> u64 {
        self.buckets
            .iter()
            .fold(0, |acc, b| acc.saturating_add(b.count_between(start, end)))
    }

    /// Interpolated sum over `[start, end)`.
    #[must_use]
    pub fn sum_between(&self, start: TimePoint, end: TimePoint) -> i64 {
        self.buckets
            .iter()
            .fold(0, |acc, b| acc.saturating_add(b.sum_between(start, end)))
    }

    /// Average sample over `[start, end)`.
    #[must_use]
    pub fn avg_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        R::ratio(
            self.sum_between(start, end),
            count_as_i64(self.count_between(start, end)),
        )
    }

    /// Sum per second over `[start, end)`.
    #[must_use]
    pub fn rate_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        let elapsed = self
            .buckets
            .iter()
            .map(|b| b.level_for(start).elapsed_between(start, end))
            .max()
            .unwrap_or(0);
        R::ratio(self.sum_between(start, end), elapsed)
    }

    /// Lower bound of the bucket holding the `pct`th percentile at `level`.
    ///
    /// `pct` is clamped to 100. An empty histogram reports `min`.
    #[must_use]
    pub fn percentile_bucket_min(&self, pct: u8, level: usize) -> i64 {
        let index = self
            .percentile_bucket(pct, |b| b.count(level))
            .map_or(1, |found| found.index);
        self.geometry.bucket_min(index)
    }

    /// [`percentile_bucket_min`](Self::percentile_bucket_min) over `[start, end)`.
    #[must_use]
    pub fn percentile_bucket_min_between(
        &self,
        pct: u8,
        start: TimePoint,
        end: TimePoint,
    ) -> i64 {
        let index = self
            .percentile_bucket(pct, |b| b.count_between(start, end))
            .map_or(1, |found| found.index);
        self.geometry.bucket_min(index)
    }

    /// Estimated `pct`th percentile at `level`, zero when empty.
    ///
    /// Samples are assumed to spread linearly from the bucket's lower bound
    /// to its average over the first half of the bucket's percentile span,
    /// and from the average to the upper bound over the second half. The
    /// underflow and overflow buckets mirror their average around `min` and
    /// `max` respectively.
    #[must_use]
    pub fn percentile(&self, pct: u8, level: usize) -> i64 {
        self.estimate(pct, |b| b.count(level), |b| b.avg(level))
    }

    /// [`percentile`](Self::percentile) over `[start, end)`.
    #[must_use]
    pub fn percentile_between(&self, pct: u8, start: TimePoint, end: TimePoint) -> i64 {
        self.estimate(
            pct,
            |b| b.count_between(start, end),
            |b| b.avg_between(start, end),
        )
    }

    fn percentile_bucket<C>(&self, pct: u8, count_of: C) -> Option<PercentileBucket>
    where
        C: Fn(&MultiLevelAggregate) -> u64,
    {
        let counts: Vec<u64> = self.buckets.iter().map(count_of).collect();
        let total = counts.iter().fold(0_u64, |acc, c| acc.saturating_add(*c));
        if total == 0 {
            return None;
        }

        // Compare pct / 100 <= through / total without leaving integers.
        let target = u128::from(pct.min(100)).saturating_mul(u128::from(total));
        let mut found = PercentileBucket {
            index: 0,
            below: 0,
            through: 0,
            total,
        };
        for (index, count) in counts.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            found = PercentileBucket {
                index,
                below: found.through,
                through: found.through.saturating_add(count),
                total,
            };
            if target <= u128::from(found.through).saturating_mul(100) {
                break;
            }
        }
        Some(found)
    }

    fn spread(&self, index: usize, avg: i64) -> Spread {
        let geometry = &self.geometry;
        if index == 0 {
            if avg > geometry.min {
                return Spread::Fixed(geometry.min);
            }
            let high = geometry.min;
            let low = high.saturating_sub(high.saturating_sub(avg).saturating_mul(2));
            return Spread::Between(low, high);
        }
        if index >= geometry.overflow_index() {
            if avg < geometry.max {
                return Spread::Fixed(geometry.max);
            }
            let low = geometry.max;
            let high = low.saturating_add(avg.saturating_sub(low).saturating_mul(2));
            return Spread::Between(low, high);
        }
        let low = geometry.bucket_min(index);
        let high = geometry.bucket_max(index);
        if avg < low || avg > high {
            return Spread::Fixed(low.midpoint(high));
        }
        Spread::Between(low, high)
    }

    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        reason = "percentile estimates are interpolated approximations"
    )]
    fn estimate<C, A>(&self, pct: u8, count_of: C, avg_of: A) -> i64
    where
        C: Fn(&MultiLevelAggregate) -> u64,
        A: Fn(&MultiLevelAggregate) -> i64,
    {
        let Some(found) = self.percentile_bucket(pct, count_of) else {
            return 0;
        };
        let Some(bucket) = self.buckets.get(found.index) else {
            return 0;
        };
        let avg = avg_of(bucket);
        let (low, high) = match self.spread(found.index, avg) {
            Spread::Between(low, high) => (low, high),
            Spread::Fixed(value) => return value,
        };

        let total = found.total as f64;
        let low_pct = found.below as f64 / total;
        let high_pct = found.through as f64 / total;
        let median_pct = (low_pct + high_pct) / 2.0;
        let pct = f64::from(pct.min(100)) / 100.0;
        let (low, avg, high) = (low as f64, avg as f64, high as f64);

        let estimate = if pct < median_pct {
            low + (avg - low) * ((pct - low_pct) / (median_pct - low_pct))
        } else {
            avg + (high - avg) * ((pct - median_pct) / (high_pct - median_pct))
        };
        estimate as i64
    }
}
