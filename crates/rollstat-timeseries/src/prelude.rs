//! Prelude for rollstat-timeseries.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use rollstat_timeseries::prelude::*;
//!
//! let mut agg = MultiLevelAggregate::new(&LevelConfig::minute())?;
//! agg.add_value(TimePoint::from_secs(0), 1);
//! # Ok::<(), TimeseriesError>(())
//! ```

pub use crate::aggregate::MultiLevelAggregate;
pub use crate::bucket::Bucket;
pub use crate::config::{LevelConfig, LevelConfigBuilder, LevelSpec};
pub use crate::error::{TimeseriesError, TimeseriesResult};
pub use crate::histogram::{HistogramConfig, HistogramGeometry, TimeseriesHistogram};
pub use crate::level::Level;
pub use crate::time::{StatNumber, TimePoint};
