//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use rollstat_test_helpers::prelude::*;
//! ```

pub use crate::fixtures::{SeriesFixture, SeriesRun};
pub use crate::must::{must, must_some};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
