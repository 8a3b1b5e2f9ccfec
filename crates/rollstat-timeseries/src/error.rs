//! Error types for level and histogram configuration.

use thiserror::Error;

/// Errors raised while validating a level or histogram configuration.
///
/// Recording and querying values never fail; only building an aggregate or
/// histogram from an invalid configuration does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeseriesError {
    /// A level's bucket width or bucket count is unusable.
    #[error("Invalid level {index}: {reason}")]
    InvalidLevel {
        /// Position of the offending level in the configuration.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Level coverages are not strictly increasing.
    #[error("Level {index} must cover more time than the level before it")]
    NonIncreasingCoverage {
        /// Position of the offending level in the configuration.
        index: usize,
    },

    /// A histogram's value range or bucket width is unusable.
    #[error("Invalid histogram: {reason}")]
    InvalidHistogram {
        /// What is wrong with it.
        reason: String,
    },
}

impl TimeseriesError {
    /// Create an invalid level error.
    #[must_use]
    pub fn invalid_level(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidLevel {
            index,
            reason: reason.into(),
        }
    }

    /// Create a non-increasing coverage error.
    #[must_use]
    pub const fn non_increasing_coverage(index: usize) -> Self {
        Self::NonIncreasingCoverage { index }
    }

    /// Create an invalid histogram error.
    #[must_use]
    pub fn invalid_histogram(reason: impl Into<String>) -> Self {
        Self::InvalidHistogram {
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for timeseries operations.
pub type TimeseriesResult<T> = std::result::Result<T, TimeseriesError>;
