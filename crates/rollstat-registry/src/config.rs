//! Registry configuration.

use rollstat_timeseries::LevelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RegistryError, RegistryResult};
use crate::export::{ExportSet, ExportType};

/// Configuration for a [`NamedRegistry`](crate::NamedRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Levels used for stats created without an explicit level configuration.
    pub default_levels: LevelConfig,
    /// Export types enabled on every newly created stat.
    pub default_exports: Vec<ExportType>,
    /// Period of the background aggregator.
    pub aggregation_interval: Duration,
    /// Number of stat names past which a growth warning is logged once.
    /// Zero disables the warning.
    pub name_warning_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_levels: LevelConfig::minute_hour(),
            default_exports: Vec::new(),
            aggregation_interval: Duration::from_secs(1),
            name_warning_threshold: 10_000,
        }
    }
}

impl RegistryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the default levels are invalid or the aggregation
    /// interval is zero.
    pub fn validate(&self) -> RegistryResult<()> {
        self.default_levels.validate()?;
        if self.aggregation_interval.is_zero() {
            return Err(RegistryError::invalid_configuration(
                "aggregation_interval must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Default exports as a bitset.
    #[must_use]
    pub fn default_export_set(&self) -> ExportSet {
        self.default_exports.iter().copied().collect()
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

/// Builder for `RegistryConfig`.
#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Set the default level configuration.
    #[must_use]
    pub fn default_levels(mut self, levels: LevelConfig) -> Self {
        self.config.default_levels = levels;
        self
    }

    /// Enable an export type on every new stat.
    #[must_use]
    pub fn default_export(mut self, export: ExportType) -> Self {
        if !self.config.default_exports.contains(&export) {
            self.config.default_exports.push(export);
        }
        self
    }

    /// Set the background aggregation period.
    #[must_use]
    pub fn aggregation_interval(mut self, interval: Duration) -> Self {
        self.config.aggregation_interval = interval;
        self
    }

    /// Set the name-growth warning threshold.
    #[must_use]
    pub fn name_warning_threshold(mut self, names: usize) -> Self {
        self.config.name_warning_threshold = names;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> RegistryResult<RegistryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
