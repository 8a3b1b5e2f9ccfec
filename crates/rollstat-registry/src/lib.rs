//! # rollstat-registry
//!
//! Named rolling stats shared across threads, with a per-thread fast path.
//!
//! Services record values by name. The first update of a name on a thread
//! resolves it in a shared [`NamedRegistry`]; later updates on that thread
//! only touch a thread-private buffer. Buffers are folded into the shared
//! aggregates periodically by an [`Aggregator`], on every read of the name,
//! and when the thread exits.
//!
//! ## Architecture
//!
//! - [`registry`] - Name maps for stats, histograms and flat counters, reads
//!   and exported counters
//! - [`guarded`] - One aggregate behind its own lock, plus export flags
//! - [`histogram`] - One value histogram behind its own lock, plus
//!   percentile exports
//! - [`counter`] - Flat counters with no time history
//! - [`local`] - Per-thread cache of stat, histogram and counter handles
//! - [`global`] - Process-wide registry and `thread_local!` cache
//! - [`aggregator`] - Background merge thread
//! - [`export`] - Export types and flag sets
//! - [`clock`] - Stats clock sources
//! - [`config`] - Registry configuration
//! - [`error`] - Registry error types
//!
//! ## Guarantees
//!
//! - Recording and reading never fail and never panic
//! - Updates to different names never contend
//! - A name resolves to exactly one aggregate, even under a creation race
//! - Values buffered on a thread are merged before the thread's cache is
//!   discarded
//! - Names are never evicted, so the set of stat names must stay bounded
//!
//! ## Example
//!
//! ```rust
//! use rollstat_registry::prelude::*;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(TimePoint::from_secs(0)));
//! let registry = Arc::new(NamedRegistry::with_clock(RegistryConfig::default(), clock.clone())?);
//!
//! let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
//! for _ in 0..60 {
//!     clock.advance(1);
//!     cache.add_stat_value_with_export("requests", 1, ExportType::Rate);
//!     cache.flush();
//! }
//!
//! assert_eq!(registry.get_sum("requests", Window::Level(0)), 60);
//! assert_eq!(registry.counter("requests.rate.60"), Some(1));
//! # Ok::<(), RegistryError>(())
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

pub mod aggregator;
mod buffers;
pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod export;
pub mod global;
pub mod guarded;
pub mod histogram;
pub mod local;
pub mod registry;

pub mod prelude;

pub use aggregator::Aggregator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryConfig, RegistryConfigBuilder};
pub use counter::FlatCounter;
pub use error::{RegistryError, RegistryResult};
pub use export::{ExportSet, ExportType};
pub use guarded::GuardedAggregate;
pub use histogram::GuardedHistogram;
pub use local::{StatHandle, ThreadLocalCache};
pub use registry::{NamedRegistry, Window};
