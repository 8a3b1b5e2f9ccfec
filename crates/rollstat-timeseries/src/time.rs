//! Time points and numeric projections used by the aggregation engine.
//!
//! The stats clock ticks in whole seconds. A [`TimePoint`] is a signed count
//! of seconds since an arbitrary epoch, so tests can start at zero while
//! production code feeds wall-clock seconds.

use core::fmt;

/// A point on the stats clock, in whole seconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePoint(i64);

impl TimePoint {
    /// The epoch itself.
    pub const ZERO: Self = Self(0);

    /// Create a time point `secs` seconds after the epoch.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Seconds since the epoch.
    #[must_use]
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Shift this time point by `secs` seconds (negative moves backwards).
    ///
    /// Saturates at the bounds of the representation.
    #[must_use]
    pub const fn offset(self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds from `earlier` to `self` (negative if `earlier` is later).
    #[must_use]
    pub const fn secs_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// The next tick after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        self.offset(1)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Numeric type an average or rate can be projected into.
///
/// Integer projections truncate toward zero; floating projections keep the
/// fractional part. A zero denominator always yields zero.
pub trait StatNumber: Copy + PartialEq + fmt::Debug {
    /// The zero value of this type.
    const ZERO: Self;

    /// `numerator / denominator`, or zero when `denominator` is zero.
    fn ratio(numerator: i64, denominator: i64) -> Self;

    /// Scale this value by an integer factor (used for percentages).
    #[must_use]
    fn scaled(self, factor: i64) -> Self;
}

impl StatNumber for i64 {
    const ZERO: Self = 0;

    fn ratio(numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            return 0;
        }
        numerator.checked_div(denominator).unwrap_or(0)
    }

    fn scaled(self, factor: i64) -> Self {
        self.saturating_mul(factor)
    }
}

impl StatNumber for f64 {
    const ZERO: Self = 0.0;

    #[expect(
        clippy::cast_precision_loss,
        reason = "stat values are telemetry, not exact arithmetic"
    )]
    fn ratio(numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            return 0.0;
        }
        numerator as f64 / denominator as f64
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "scale factors are small constants"
    )]
    fn scaled(self, factor: i64) -> Self {
        self * factor as f64
    }
}

/// Scale `value` by `part / whole` with integer truncation.
///
/// Intermediate math runs in 128 bits so a large bucket sum multiplied by a
/// long overlap cannot overflow. Returns `value` unchanged when `whole` is
/// not positive.
#[must_use]
pub fn interpolate(value: i64, part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return value;
    }
    let scaled = i128::from(value)
        .saturating_mul(i128::from(part))
        .checked_div(i128::from(whole))
        .unwrap_or(0);
    i64::try_from(scaled).unwrap_or(if scaled.is_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}
