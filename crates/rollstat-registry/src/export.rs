//! Export types and the per-stat export flag set.
//!
//! An export type names one projection of a stat (sum, count, average,
//! rate, percent) that the reporting side should publish. Each stat and
//! histogram keeps a small bitset of the types enabled for it.

use core::fmt;
use rollstat_timeseries::{MultiLevelAggregate, StatNumber};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// A projection of a stat that can be exported as a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    /// Sum of values in the window.
    Sum,
    /// Number of samples in the window.
    Count,
    /// Average sample value.
    Avg,
    /// Sum per second.
    Rate,
    /// Average scaled by 100.
    Percent,
}

impl ExportType {
    /// Every export type, in bit order.
    pub const ALL: [Self; 5] = [Self::Sum, Self::Count, Self::Avg, Self::Rate, Self::Percent];

    /// Suffix used in exported counter names.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Rate => "rate",
            Self::Percent => "pct",
        }
    }

    const fn bit(self) -> u8 {
        match 1_u8.checked_shl(self as u32) {
            Some(bit) => bit,
            None => 0,
        }
    }

    /// Project the level at `index` of `aggregate` onto this export type.
    #[must_use]
    pub fn project(self, aggregate: &MultiLevelAggregate, index: usize) -> i64 {
        self.project_totals(
            aggregate.sum(index),
            aggregate.count(index),
            aggregate.elapsed(index),
        )
    }

    /// Project raw window totals onto this export type.
    #[must_use]
    pub fn project_totals(self, sum: i64, count: u64, elapsed_secs: i64) -> i64 {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        match self {
            Self::Sum => sum,
            Self::Count => count,
            Self::Avg => i64::ratio(sum, count),
            Self::Rate => i64::ratio(sum, elapsed_secs),
            Self::Percent => i64::ratio(sum.saturating_mul(100), count),
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Set of enabled export types, stored as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExportSet(u8);

impl ExportSet {
    /// No export types.
    pub const EMPTY: Self = Self(0);

    const MASK: u8 = (1 << ExportType::ALL.len()) - 1;

    /// Rebuild a set from its raw bits, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether `export` is in the set.
    #[must_use]
    pub const fn contains(self, export: ExportType) -> bool {
        self.0 & export.bit() != 0
    }

    /// Add `export`. Returns `true` if it was not already present.
    pub fn insert(&mut self, export: ExportType) -> bool {
        let added = !self.contains(export);
        self.0 |= export.bit();
        added
    }

    /// Remove `export`. Returns `true` if it was present.
    pub fn remove(&mut self, export: ExportType) -> bool {
        let removed = self.contains(export);
        self.0 &= !export.bit();
        removed
    }

    /// Whether no export type is enabled.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of enabled export types.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the enabled export types in bit order.
    pub fn iter(self) -> impl Iterator<Item = ExportType> {
        ExportType::ALL
            .into_iter()
            .filter(move |export| self.contains(*export))
    }
}

/// Export flags shared between threads.
#[derive(Debug, Default)]
pub(crate) struct AtomicExportSet(AtomicU8);

impl AtomicExportSet {
    pub(crate) const fn new(set: ExportSet) -> Self {
        Self(AtomicU8::new(set.bits()))
    }

    pub(crate) fn load(&self) -> ExportSet {
        ExportSet::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Returns `true` if `export` was not already set.
    pub(crate) fn insert(&self, export: ExportType) -> bool {
        let bit = export.bit();
        self.0.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Returns `true` if `export` was set.
    pub(crate) fn remove(&self, export: ExportType) -> bool {
        let bit = export.bit();
        self.0.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }
}

impl FromIterator<ExportType> for ExportSet {
    fn from_iter<I: IntoIterator<Item = ExportType>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for export in iter {
            set.insert(export);
        }
        set
    }
}

impl fmt::Display for ExportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, export) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{export}")?;
        }
        f.write_str("}")
    }
}
