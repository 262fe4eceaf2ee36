//! Expanding retry intervals.
//!
//! The schedule walks `0, 1, 2, 5, 10, 15, 30` minutes. Each call to
//! [`RetrySchedule::advance`] moves one step forward, but only once the
//! current interval has fully elapsed since the last step, and never past
//! the final entry.

use crate::clock::Timestamp;
use std::time::Duration;

/// Retry intervals in minutes
pub const RETRY_INTERVALS_MINUTES: [u64; 7] = [0, 1, 2, 5, 10, 15, 30];

/// Backoff state for one kind of retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    start: Timestamp,
    step: usize,
    last_increment: Timestamp,
}

impl RetrySchedule {
    /// Schedule starting at `now` on the first step
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            start: now,
            step: 0,
            last_increment: Timestamp::ZERO,
        }
    }

    /// Back to the first step
    pub fn reset(&mut self, now: Timestamp) {
        *self = Self::new(now);
    }

    /// When the schedule was last reset
    #[must_use]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Current index into [`RETRY_INTERVALS_MINUTES`]
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Length of the current step
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(RETRY_INTERVALS_MINUTES[self.step] * 60)
    }

    /// Earliest time the next attempt is allowed, counted from `now`
    #[must_use]
    pub fn next_try(&self, now: Timestamp) -> Timestamp {
        now + self.interval()
    }

    /// Step forward if the current interval has elapsed since the last step
    pub fn advance(&mut self, now: Timestamp) {
        if now > self.last_increment + self.interval() {
            self.last_increment = now;
            if self.step < RETRY_INTERVALS_MINUTES.len() - 1 {
                self.step += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    #[test]
    fn test_first_advance_is_immediate() {
        let now = Timestamp::from_millis(10 * MINUTE);
        let mut retry = RetrySchedule::new(now);
        assert_eq!(retry.next_try(now), now);

        retry.advance(now);
        assert_eq!(retry.step(), 1);
        assert_eq!(retry.next_try(now), Timestamp::from_millis(11 * MINUTE));
    }

    #[test]
    fn test_waits_for_interval() {
        let t0 = Timestamp::from_millis(100 * MINUTE);
        let mut retry = RetrySchedule::new(t0);
        retry.advance(t0);

        // 1 minute step must fully elapse
        retry.advance(Timestamp::from_millis(101 * MINUTE));
        assert_eq!(retry.step(), 1);
        retry.advance(Timestamp::from_millis(101 * MINUTE + 1));
        assert_eq!(retry.step(), 2);
    }

    #[test]
    fn test_saturates() {
        let mut now = Timestamp::from_millis(MINUTE);
        let mut retry = RetrySchedule::new(now);
        for _ in 0..100 {
            now = now + Duration::from_secs(3600);
            retry.advance(now);
        }
        assert_eq!(retry.step(), RETRY_INTERVALS_MINUTES.len() - 1);
        assert_eq!(retry.interval(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_reset() {
        let mut retry = RetrySchedule::new(Timestamp::ZERO);
        retry.advance(Timestamp::from_millis(5));
        let later = Timestamp::from_millis(99 * MINUTE);
        retry.reset(later);
        assert_eq!(retry.step(), 0);
        assert_eq!(retry.start(), later);
    }
}
