//! One time-resolution tier of the aggregation engine.
//!
//! A [`Level`] is a ring of [`Bucket`]s covering `bucket_width * bucket_count`
//! seconds, or an unbounded all-time accumulator when the width is zero.
//! Buckets are aligned to absolute time: a timestamp `t` always lands in
//! bucket `(t mod coverage) / bucket_width`, so two levels with the same
//! geometry agree on bucket boundaries regardless of when they were created.
//!
//! # Time model
//!
//! The level remembers the first and latest timestamps it has seen. Data is
//! never tracked before the first timestamp, and the retained window ends at
//! the end of the bucket holding the latest timestamp. [`Level::elapsed`]
//! treats `[earliest, latest]` as an inclusive interval, so a level that has
//! seen a single tick reports an elapsed time of one second.

use crate::bucket::{Bucket, count_as_i64};
use crate::time::{StatNumber, TimePoint, interpolate};

/// Position of a timestamp within a level's ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketInfo {
    index: usize,
    start: TimePoint,
    next_start: TimePoint,
}

/// A rolling window of buckets, or the all-time accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    bucket_width: i64,
    buckets: Vec<Bucket>,
    total: Bucket,
    first_time: Option<TimePoint>,
    latest_time: TimePoint,
}

impl Level {
    /// Create a bucketed level of `bucket_count` buckets, each
    /// `bucket_width_secs` wide.
    ///
    /// Both arguments are clamped to at least one.
    #[must_use]
    pub fn bucketed(bucket_width_secs: i64, bucket_count: usize) -> Self {
        Self {
            bucket_width: bucket_width_secs.max(1),
            buckets: vec![Bucket::EMPTY; bucket_count.max(1)],
            total: Bucket::EMPTY,
            first_time: None,
            latest_time: TimePoint::ZERO,
        }
    }

    /// Create the unbounded all-time level.
    #[must_use]
    pub const fn all_time() -> Self {
        Self {
            bucket_width: 0,
            buckets: Vec::new(),
            total: Bucket::EMPTY,
            first_time: None,
            latest_time: TimePoint::ZERO,
        }
    }

    /// Whether this is the all-time level.
    #[must_use]
    pub const fn is_all_time(&self) -> bool {
        self.bucket_width == 0
    }

    /// Whether nothing has been recorded or flushed since creation or the
    /// last [`clear`](Self::clear).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_time.is_none()
    }

    /// Width of one bucket in seconds (zero for the all-time level).
    #[must_use]
    pub const fn bucket_width_secs(&self) -> i64 {
        self.bucket_width
    }

    /// Number of buckets in the ring (zero for the all-time level).
    #[must_use]
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Total coverage in seconds (zero for the all-time level).
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        self.bucket_width.saturating_mul(self.ring_len())
    }

    /// Read-only view of the bucket ring, in slot order.
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// First timestamp seen, if any.
    #[must_use]
    pub const fn first_time(&self) -> Option<TimePoint> {
        self.first_time
    }

    /// Latest timestamp seen.
    #[must_use]
    pub const fn latest_time(&self) -> TimePoint {
        self.latest_time
    }

    /// Record a single value at `now`.
    ///
    /// Returns `false` if the value was too old to fit in the retained
    /// window and was dropped.
    pub fn add_value(&mut self, now: TimePoint, value: i64) -> bool {
        self.add_value_aggregated(now, value, 1)
    }

    /// Record `count` samples summing to `sum` at `now`.
    ///
    /// A timestamp later than the latest one seen first rotates the ring
    /// forward. An earlier timestamp is recorded into the bucket it maps to
    /// while that bucket is still retained, and dropped (returning `false`)
    /// once it has expired. The latest timestamp never moves backwards.
    pub fn add_value_aggregated(&mut self, now: TimePoint, sum: i64, count: u64) -> bool {
        if self.is_all_time() {
            self.extend_span(now);
            self.total.add(sum, count);
            return true;
        }

        let index = if self.first_time.is_none() {
            self.first_time = Some(now);
            self.latest_time = now;
            self.bucket_index(now)
        } else if now > self.latest_time {
            self.advance(now)
        } else if now == self.latest_time {
            self.bucket_index(now)
        } else {
            if now < self.earliest_time_non_empty() {
                return false;
            }
            self.bucket_index(now)
        };

        self.total.add(sum, count);
        if let Some(bucket) = self.buckets.get_mut(index) {
            bucket.add(sum, count);
        }
        true
    }

    /// Advance the window to `now` without recording a value.
    ///
    /// Expired buckets are evicted. Times at or before the latest timestamp
    /// are a no-op.
    pub fn flush(&mut self, now: TimePoint) {
        if self.first_time.is_none() {
            self.first_time = Some(now);
            self.latest_time = now;
            return;
        }
        if self.is_all_time() {
            self.latest_time = self.latest_time.max(now);
            return;
        }
        if now > self.latest_time {
            self.advance(now);
        }
    }

    /// Reset to the freshly-created state.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.total.clear();
        self.first_time = None;
        self.latest_time = TimePoint::ZERO;
    }

    /// Sum of every value in the retained window.
    #[must_use]
    pub const fn sum(&self) -> i64 {
        self.total.sum
    }

    /// Number of samples in the retained window.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.total.count
    }

    /// Average sample value over the retained window.
    #[must_use]
    pub fn avg<R: StatNumber>(&self) -> R {
        self.total.avg()
    }

    /// Sum per second over the retained window.
    #[must_use]
    pub fn rate<R: StatNumber>(&self) -> R {
        R::ratio(self.total.sum, self.elapsed())
    }

    /// Samples per second over the retained window.
    #[must_use]
    pub fn count_rate<R: StatNumber>(&self) -> R {
        R::ratio(count_as_i64(self.total.count), self.elapsed())
    }

    /// Earliest timestamp the level is currently tracking.
    #[must_use]
    pub fn earliest_time(&self) -> TimePoint {
        let Some(first) = self.first_time else {
            return TimePoint::ZERO;
        };
        if self.is_all_time() {
            return first;
        }
        self.earliest_time_non_empty().max(first)
    }

    /// Start of the oldest bucket slot in the ring, whether or not data has
    /// been recorded that far back.
    #[must_use]
    pub fn earliest_time_non_empty(&self) -> TimePoint {
        if self.is_all_time() {
            return self.first_time.unwrap_or(TimePoint::ZERO);
        }
        let info = self.bucket_info(self.latest_time);
        info.next_start.offset(-self.duration_secs())
    }

    /// Seconds of history covered, inclusive of the latest tick.
    #[must_use]
    pub fn elapsed(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.latest_time
            .secs_since(self.earliest_time())
            .saturating_add(1)
    }

    /// Seconds of `[start, end)` that fall within the tracked history.
    #[must_use]
    pub fn elapsed_between(&self, start: TimePoint, end: TimePoint) -> i64 {
        if self.is_empty() {
            return 0;
        }
        let start = start.max(self.earliest_time());
        let end = end.min(self.latest_time.next()).max(start);
        end.secs_since(start)
    }

    /// Interpolated sum over `[start, end)`.
    #[must_use]
    pub fn sum_between(&self, start: TimePoint, end: TimePoint) -> i64 {
        let mut total = 0_i64;
        self.for_each_bucket_between(start, end, |bucket, bucket_start, next_start| {
            let part = self.range_adjust(bucket_start, next_start, start, end, bucket.sum);
            total = total.saturating_add(part);
        });
        total
    }

    /// Interpolated sample count over `[start, end)`.
    #[must_use]
    pub fn count_between(&self, start: TimePoint, end: TimePoint) -> u64 {
        let mut total = 0_u64;
        self.for_each_bucket_between(start, end, |bucket, bucket_start, next_start| {
            let count = count_as_i64(bucket.count);
            let part = self.range_adjust(bucket_start, next_start, start, end, count);
            total = total.saturating_add(u64::try_from(part).unwrap_or(0));
        });
        total
    }

    /// Average sample value over `[start, end)`.
    #[must_use]
    pub fn avg_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        let sum = self.sum_between(start, end);
        let count = self.count_between(start, end);
        R::ratio(sum, count_as_i64(count))
    }

    /// Sum per second over `[start, end)`.
    #[must_use]
    pub fn rate_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        R::ratio(
            self.sum_between(start, end),
            self.elapsed_between(start, end),
        )
    }

    /// Samples per second over `[start, end)`.
    #[must_use]
    pub fn count_rate_between<R: StatNumber>(&self, start: TimePoint, end: TimePoint) -> R {
        R::ratio(
            count_as_i64(self.count_between(start, end)),
            self.elapsed_between(start, end),
        )
    }

    fn ring_len(&self) -> i64 {
        i64::try_from(self.buckets.len()).unwrap_or(i64::MAX)
    }

    fn extend_span(&mut self, now: TimePoint) {
        match self.first_time {
            None => {
                self.first_time = Some(now);
                self.latest_time = now;
            }
            Some(first) => {
                if now > self.latest_time {
                    self.latest_time = now;
                } else if now < first {
                    self.first_time = Some(now);
                }
            }
        }
    }

    fn bucket_index(&self, time: TimePoint) -> usize {
        self.bucket_info(time).index
    }

    fn bucket_info(&self, time: TimePoint) -> BucketInfo {
        let width = self.bucket_width.max(1);
        let secs = time.as_secs();
        let into_cycle = secs.rem_euclid(self.duration_secs().max(1));
        let index = usize::try_from(into_cycle.checked_div(width).unwrap_or(0)).unwrap_or(0);
        let start = TimePoint::from_secs(secs.saturating_sub(secs.rem_euclid(width)));
        BucketInfo {
            index,
            start,
            next_start: start.offset(width),
        }
    }

    /// Move the latest timestamp forward to `now`, evicting every bucket
    /// that falls out of the window. Returns the index of the new current
    /// bucket.
    fn advance(&mut self, now: TimePoint) -> usize {
        let current = self.bucket_info(self.latest_time);
        self.latest_time = now;

        if now < current.next_start {
            return current.index;
        }

        if now >= current.start.offset(self.duration_secs()) {
            for bucket in &mut self.buckets {
                bucket.clear();
            }
            self.total.clear();
            return self.bucket_index(now);
        }

        let target = self.bucket_index(now);
        let len = self.buckets.len();
        let mut index = current.index;
        while index != target {
            index = index.saturating_add(1).checked_rem(len).unwrap_or(0);
            if let Some(bucket) = self.buckets.get_mut(index) {
                self.total.subtract(bucket);
                bucket.clear();
            }
        }
        target
    }

    /// Visit every bucket oldest-first with its `[start, next_start)` span.
    fn for_each_bucket<F>(&self, mut visit: F)
    where
        F: FnMut(&Bucket, TimePoint, TimePoint) -> bool,
    {
        let Some(first) = self.first_time else {
            return;
        };
        if self.is_all_time() {
            visit(&self.total, first, self.latest_time.next());
            return;
        }

        let len = self.buckets.len();
        let latest_index = self.bucket_index(self.latest_time);
        let mut start = self.earliest_time_non_empty();
        for step in 1..=len {
            let index = latest_index.saturating_add(step).checked_rem(len).unwrap_or(0);
            let next_start = start.offset(self.bucket_width);
            if let Some(bucket) = self.buckets.get(index) {
                if !visit(bucket, start, next_start) {
                    break;
                }
            }
            start = next_start;
        }
    }

    /// Visit only the buckets overlapping `[start, end)`.
    fn for_each_bucket_between<F>(&self, start: TimePoint, end: TimePoint, mut visit: F)
    where
        F: FnMut(&Bucket, TimePoint, TimePoint),
    {
        self.for_each_bucket(|bucket, bucket_start, next_start| {
            if start >= next_start {
                return true;
            }
            if end <= bucket_start {
                return false;
            }
            visit(bucket, bucket_start, next_start);
            true
        });
    }

    /// Scale a bucket's value down to the part of `[start, end)` it
    /// overlaps, assuming values are spread evenly across the bucket.
    ///
    /// The bucket holding the latest timestamp only has data up to that
    /// tick, so its span is cut off there before computing the fraction.
    fn range_adjust(
        &self,
        bucket_start: TimePoint,
        next_start: TimePoint,
        start: TimePoint,
        end: TimePoint,
        value: i64,
    ) -> i64 {
        let mut next_start = next_start;
        if bucket_start <= self.latest_time && next_start > self.latest_time {
            next_start = self.latest_time.next();
        }

        if start <= bucket_start && end >= next_start {
            return value;
        }

        let overlap_start = start.max(bucket_start);
        let overlap_end = end.min(next_start);
        let overlap = overlap_end.secs_since(overlap_start).max(0);
        interpolate(value, overlap, next_start.secs_since(bucket_start))
    }
}
