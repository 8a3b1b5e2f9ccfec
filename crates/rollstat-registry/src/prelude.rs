//! Prelude for rollstat-registry.
//!
//! This module re-exports the most commonly used types for convenient importing,
//! including the timeseries types that appear in the registry API.
//!
//! # Example
//!
//! ```rust
//! use rollstat_registry::prelude::*;
//!
//! let registry = NamedRegistry::default();
//! registry.add_value("errors", registry.now(), 1);
//! assert_eq!(registry.get_count("errors", Window::Level(0)), 1);
//! ```

pub use crate::aggregator::Aggregator;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{RegistryConfig, RegistryConfigBuilder};
pub use crate::counter::FlatCounter;
pub use crate::error::{RegistryError, RegistryResult};
pub use crate::export::{ExportSet, ExportType};
pub use crate::guarded::GuardedAggregate;
pub use crate::histogram::GuardedHistogram;
pub use crate::local::{StatHandle, ThreadLocalCache};
pub use crate::registry::{NamedRegistry, Window};
pub use rollstat_timeseries::{
    HistogramConfig, HistogramGeometry, LevelConfig, LevelSpec, StatNumber, TimePoint,
};
