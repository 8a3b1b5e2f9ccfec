//! Fixed-size accumulator for one time slot.

use crate::time::StatNumber;

/// Sum and sample count of every value recorded in one time slot.
///
/// # RT Safety
///
/// This is a POD type. All methods are allocation-free and saturate instead
/// of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bucket {
    /// Sum of all recorded values.
    pub sum: i64,
    /// Number of recorded samples.
    pub count: u64,
}

impl Bucket {
    /// An empty bucket.
    pub const EMPTY: Self = Self { sum: 0, count: 0 };

    /// Create a bucket holding a pre-aggregated batch.
    #[must_use]
    pub const fn new(sum: i64, count: u64) -> Self {
        Self { sum, count }
    }

    /// Record `count` samples summing to `sum`.
    #[inline]
    pub fn add(&mut self, sum: i64, count: u64) {
        self.sum = self.sum.saturating_add(sum);
        self.count = self.count.saturating_add(count);
    }

    /// Fold another bucket into this one.
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.add(other.sum, other.count);
    }

    /// Remove another bucket's contribution from this one.
    #[inline]
    pub fn subtract(&mut self, other: &Self) {
        self.sum = self.sum.saturating_sub(other.sum);
        self.count = self.count.saturating_sub(other.count);
    }

    /// Reset to empty.
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// Take the contents, leaving the bucket empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Whether no samples have been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Average of the recorded samples, zero when empty.
    #[must_use]
    pub fn avg<R: StatNumber>(&self) -> R {
        R::ratio(self.sum, count_as_i64(self.count))
    }
}

/// Clamp a sample count into the signed value domain.
#[must_use]
pub(crate) fn count_as_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
