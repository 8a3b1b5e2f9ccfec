//! # rollstat-timeseries
//!
//! Fixed-memory rolling aggregation at several time resolutions.
//!
//! This crate is the storage engine behind the `rollstat` registry. It keeps
//! sums and sample counts in rings of time buckets so that "how much / how
//! often over the last N seconds" can be answered without storing samples.
//!
//! ## Architecture
//!
//! - [`bucket`] - Sum and count for one time slot
//! - [`level`] - A ring of buckets covering a fixed duration, or all-time
//! - [`aggregate`] - Several levels kept consistent under one flush
//! - [`histogram`] - Value buckets with per-bucket rolling history and percentiles
//! - [`config`] - Level geometry and presets
//! - [`time`] - Stats clock time points and numeric projections
//! - [`error`] - Configuration errors
//!
//! ## Usage
//!
//! ```rust
//! use rollstat_timeseries::{MultiLevelAggregate, TimePoint};
//!
//! const MINUTE: usize = 0;
//! const HOUR: usize = 1;
//!
//! let mut agg = MultiLevelAggregate::default();
//! for tick in 0..300 {
//!     agg.add_value(TimePoint::from_secs(tick), 10);
//! }
//!
//! assert_eq!(agg.sum(MINUTE), 600);
//! assert_eq!(agg.sum(HOUR), 3000);
//! assert_eq!(agg.avg::<i64>(agg.all_time_index()), 10);
//! ```
//!
//! Interval queries interpolate partially covered buckets linearly:
//!
//! ```rust
//! use rollstat_timeseries::{MultiLevelAggregate, TimePoint};
//!
//! let mut agg = MultiLevelAggregate::default();
//! for tick in 0..120 {
//!     agg.add_value(TimePoint::from_secs(tick), 2);
//! }
//! let end = TimePoint::from_secs(120);
//! assert_eq!(agg.sum_between(end.offset(-30), end), 60);
//! assert_eq!(agg.rate_between::<i64>(end.offset(-30), end), 2);
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aggregate;
pub mod bucket;
pub mod config;
pub mod error;
pub mod histogram;
pub mod level;
pub mod time;

pub mod prelude;

pub use aggregate::MultiLevelAggregate;
pub use bucket::Bucket;
pub use config::{LevelConfig, LevelConfigBuilder, LevelSpec};
pub use error::{TimeseriesError, TimeseriesResult};
pub use histogram::{HistogramConfig, HistogramGeometry, TimeseriesHistogram};
pub use level::Level;
pub use time::{StatNumber, TimePoint, interpolate};
