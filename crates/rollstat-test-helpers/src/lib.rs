//! Shared test utilities for rollstat.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`fixtures`] - Sample series used across the aggregation test suites
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! rollstat-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use rollstat_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::panic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod fixtures;
pub mod must;
pub mod prelude;

pub use must::*;
