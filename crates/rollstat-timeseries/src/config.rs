//! Level configuration for multi-level aggregates.
//!
//! A configuration is an ordered list of `(bucket_width, bucket_count)`
//! pairs, finest first. Every aggregate built from it also carries an
//! all-time level after the configured ones, so [`LevelConfig::minute_hour`]
//! produces levels `MINUTE = 0`, `HOUR = 1` and `ALLTIME = 2`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TimeseriesError, TimeseriesResult};

/// Geometry of one bucketed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelSpec {
    /// Width of one bucket. Must be a whole, non-zero number of seconds.
    pub bucket_width: Duration,
    /// Number of buckets in the ring.
    pub bucket_count: usize,
}

impl LevelSpec {
    /// Create a level spec.
    #[must_use]
    pub const fn new(bucket_width: Duration, bucket_count: usize) -> Self {
        Self {
            bucket_width,
            bucket_count,
        }
    }

    /// Create a level spec with a bucket width in seconds.
    #[must_use]
    pub const fn from_secs(bucket_width_secs: u64, bucket_count: usize) -> Self {
        Self::new(Duration::from_secs(bucket_width_secs), bucket_count)
    }

    /// Total time covered by the ring.
    #[must_use]
    pub fn coverage(&self) -> Duration {
        let count = u32::try_from(self.bucket_count).unwrap_or(u32::MAX);
        self.bucket_width.saturating_mul(count)
    }

    /// Bucket width in whole seconds, validated.
    pub(crate) fn width_secs(&self, index: usize) -> TimeseriesResult<i64> {
        if self.bucket_width.is_zero() {
            return Err(TimeseriesError::invalid_level(
                index,
                "bucket_width must be greater than 0",
            ));
        }
        if self.bucket_width.subsec_nanos() != 0 {
            return Err(TimeseriesError::invalid_level(
                index,
                "bucket_width must be a whole number of seconds",
            ));
        }
        i64::try_from(self.bucket_width.as_secs())
            .map_err(|e| TimeseriesError::invalid_level(index, format!("bucket_width: {e}")))
    }

    fn validate(&self, index: usize) -> TimeseriesResult<i64> {
        let width = self.width_secs(index)?;
        if self.bucket_count == 0 {
            return Err(TimeseriesError::invalid_level(
                index,
                "bucket_count must be greater than 0",
            ));
        }
        i64::try_from(self.bucket_count)
            .ok()
            .and_then(|count| width.checked_mul(count))
            .ok_or_else(|| TimeseriesError::invalid_level(index, "coverage overflows"))
    }
}

/// Ordered list of bucketed levels, finest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Bucketed levels. The all-time level is implicit and always last.
    pub levels: Vec<LevelSpec>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self::minute_hour()
    }
}

impl LevelConfig {
    /// Index of the all-time level for this configuration.
    #[must_use]
    pub fn all_time_index(&self) -> usize {
        self.levels.len()
    }

    /// Last minute in one-second buckets, plus all-time.
    #[must_use]
    pub fn minute() -> Self {
        Self {
            levels: vec![LevelSpec::from_secs(1, 60)],
        }
    }

    /// Last minute (60 × 1s) and last hour (60 × 60s), plus all-time.
    #[must_use]
    pub fn minute_hour() -> Self {
        Self {
            levels: vec![LevelSpec::from_secs(1, 60), LevelSpec::from_secs(60, 60)],
        }
    }

    /// Last minute, ten minutes and hour, plus all-time.
    #[must_use]
    pub fn minute_ten_minute_hour() -> Self {
        Self {
            levels: vec![
                LevelSpec::from_secs(1, 60),
                LevelSpec::from_secs(10, 60),
                LevelSpec::from_secs(60, 60),
            ],
        }
    }

    /// Last minute, hour and day, plus all-time.
    #[must_use]
    pub fn minute_hour_day() -> Self {
        Self {
            levels: vec![
                LevelSpec::from_secs(1, 60),
                LevelSpec::from_secs(60, 60),
                LevelSpec::from_secs(1440, 60),
            ],
        }
    }

    /// Only the all-time level.
    #[must_use]
    pub const fn all_time_only() -> Self {
        Self { levels: Vec::new() }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket width is zero or fractional, a bucket
    /// count is zero, or coverage does not strictly increase level over
    /// level.
    pub fn validate(&self) -> TimeseriesResult<()> {
        let mut previous = 0_i64;
        for (index, spec) in self.levels.iter().enumerate() {
            let coverage = spec.validate(index)?;
            if coverage <= previous {
                return Err(TimeseriesError::non_increasing_coverage(index));
            }
            previous = coverage;
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> LevelConfigBuilder {
        LevelConfigBuilder::default()
    }
}

/// Builder for `LevelConfig`.
#[derive(Debug, Default)]
pub struct LevelConfigBuilder {
    levels: Vec<LevelSpec>,
}

impl LevelConfigBuilder {
    /// Append a level of `bucket_count` buckets, each `bucket_width` wide.
    #[must_use]
    pub fn level(mut self, bucket_width: Duration, bucket_count: usize) -> Self {
        self.levels.push(LevelSpec::new(bucket_width, bucket_count));
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> TimeseriesResult<LevelConfig> {
        let config = LevelConfig {
            levels: self.levels,
        };
        config.validate()?;
        Ok(config)
    }
}
