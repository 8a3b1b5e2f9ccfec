//! Clock sources for the stats clock.
//!
//! The registry reads "now" in whole seconds through a [`Clock`]. Services use
//! [`SystemClock`]; tests drive time explicitly with [`ManualClock`].

use rollstat_timeseries::TimePoint;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current stats-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Current time in whole seconds.
    fn now(&self) -> TimePoint;
}

/// Wall-clock seconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimePoint {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX));
        TimePoint::from_secs(secs)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    #[must_use]
    pub const fn new(start: TimePoint) -> Self {
        Self {
            secs: AtomicI64::new(start.as_secs()),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: TimePoint) {
        self.secs.store(time.as_secs(), Ordering::Release);
    }

    /// Move forward by `secs` seconds and return the new time.
    pub fn advance(&self, secs: i64) -> TimePoint {
        let previous = self.secs.fetch_add(secs, Ordering::AcqRel);
        TimePoint::from_secs(previous.saturating_add(secs))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_secs(self.secs.load(Ordering::Acquire))
    }
}
