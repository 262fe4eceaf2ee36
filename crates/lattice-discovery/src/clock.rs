//! Wall-clock timestamps for bootstrap bookkeeping.
//!
//! Contact and cache timestamps are persisted, so they use Unix time in
//! milliseconds rather than a monotonic clock.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch; used for "never"
    pub const ZERO: Self = Self(0);

    /// Current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(Self::ZERO, |d| {
                Self(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            })
    }

    /// From raw milliseconds
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Raw milliseconds
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Signed distance `self - earlier` in milliseconds
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(millis(rhs)))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(millis(rhs)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!((t + Duration::from_secs(2)).as_millis(), 3_000);
        assert_eq!((t - Duration::from_secs(2)).as_millis(), -1_000);
        assert_eq!(Timestamp::ZERO.millis_since(t), -1_000);
    }

    #[test]
    fn test_now_after_epoch() {
        assert!(Timestamp::now() > Timestamp::ZERO);
    }
}
