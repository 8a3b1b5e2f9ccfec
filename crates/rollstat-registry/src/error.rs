//! Error types for the stats registry.
//!
//! Recording and reading stats never fails. Errors only come out of
//! configuration, histogram setup and starting the background aggregator.

use rollstat_timeseries::TimeseriesError;
use thiserror::Error;

/// Errors that can occur while configuring or starting the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Invalid registry configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid level configuration for a stat.
    #[error(transparent)]
    Timeseries(#[from] TimeseriesError),

    /// The background aggregator thread could not be started.
    #[error("Failed to spawn aggregator thread: {0}")]
    AggregatorSpawn(String),

    /// A percentile outside `0..=100` was requested.
    #[error("Invalid percentile {0}: must be between 0 and 100")]
    InvalidPercentile(u8),

    /// No histogram is registered under the name.
    #[error("Unknown histogram: {0}")]
    UnknownHistogram(String),
}

impl RegistryError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create an aggregator spawn error.
    #[must_use]
    pub fn aggregator_spawn(reason: impl Into<String>) -> Self {
        Self::AggregatorSpawn(reason.into())
    }

    /// Create an unknown histogram error.
    #[must_use]
    pub fn unknown_histogram(name: impl Into<String>) -> Self {
        Self::UnknownHistogram(name.into())
    }
}

/// A specialized `Result` type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
