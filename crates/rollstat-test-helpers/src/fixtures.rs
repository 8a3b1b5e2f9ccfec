//! Sample series fixtures.
//!
//! A [`SeriesFixture`] is a list of runs, each run being `samples` values of
//! the same `value` recorded one per tick. Feeding is done through a
//! closure so the fixture works with any sink: a level, an aggregate, a
//! registry or a thread-local cache.

/// A run of identical samples, one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesRun {
    /// Number of ticks in the run.
    pub samples: i64,
    /// Value recorded on every tick.
    pub value: i64,
}

/// Consecutive runs of samples starting at a given tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFixture {
    /// Tick of the first sample.
    pub start: i64,
    /// Runs, in time order.
    pub runs: Vec<SeriesRun>,
}

impl SeriesFixture {
    /// A series starting at `start` with no runs.
    #[must_use]
    pub fn starting_at(start: i64) -> Self {
        Self {
            start,
            runs: Vec::new(),
        }
    }

    /// Append a run of `samples` ticks, each recording `value`.
    #[must_use]
    pub fn run(mut self, samples: i64, value: i64) -> Self {
        self.runs.push(SeriesRun { samples, value });
        self
    }

    /// 7200 ticks of 1, then 3540 ticks of 10, then 60 ticks of 100.
    ///
    /// Three hours of data where the last hour and the last minute each have
    /// a distinct value, used by the interval query suites.
    #[must_use]
    pub fn three_hour_steps() -> Self {
        Self::starting_at(0)
            .run(7200, 1)
            .run(3540, 10)
            .run(60, 100)
    }

    /// Tick just after the last sample.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.runs
            .iter()
            .fold(self.start, |t, run| t.saturating_add(run.samples))
    }

    /// Sum of every sample in the series.
    #[must_use]
    pub fn total_sum(&self) -> i64 {
        self.runs.iter().fold(0_i64, |acc, run| {
            acc.saturating_add(run.samples.saturating_mul(run.value))
        })
    }

    /// Number of samples in the series.
    #[must_use]
    pub fn total_count(&self) -> i64 {
        self.runs
            .iter()
            .fold(0_i64, |acc, run| acc.saturating_add(run.samples))
    }

    /// Call `record(tick, value)` for every sample, in time order.
    ///
    /// Returns the tick just after the last sample.
    pub fn feed<F>(&self, mut record: F) -> i64
    where
        F: FnMut(i64, i64),
    {
        let mut tick = self.start;
        for run in &self.runs {
            for _ in 0..run.samples {
                record(tick, run.value);
                tick = tick.saturating_add(1);
            }
        }
        tick
    }
}
