//! Explicit second/minute timer.
//!
//! The owner polls the scheduler from its event loop and runs whatever
//! periods came due. Missed periods are not replayed in a burst: a poll
//! after a long stall reports each period at most once.

use std::time::{Duration, Instant};

/// Length of the short period
pub const SECOND: Duration = Duration::from_secs(1);

/// Length of the long period
pub const MINUTE: Duration = Duration::from_secs(60);

/// Periods due at one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ticks {
    /// One-second period elapsed
    pub second: bool,
    /// One-minute period elapsed
    pub minute: bool,
}

impl Ticks {
    /// Whether anything is due
    #[must_use]
    pub fn any(self) -> bool {
        self.second || self.minute
    }
}

/// Drives the second and minute periods from a monotonic clock.
///
/// Nothing is registered and no callback fires on its own. The owner calls
/// [`Scheduler::poll`] from its loop, typically after sleeping until
/// [`Scheduler::next_deadline`], and runs its second work when
/// [`Ticks::second`] is set, then its minute work when [`Ticks::minute`] is
/// set. A single poll can report both; second work runs first. Polling
/// early is harmless and reports nothing.
///
/// ```
/// use lattice_core::Scheduler;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut scheduler = Scheduler::new(start);
/// assert!(!scheduler.poll(start).any());
///
/// let ticks = scheduler.poll(start + Duration::from_secs(60));
/// assert!(ticks.second && ticks.minute);
/// ```
#[derive(Debug, Clone)]
pub struct Scheduler {
    next_second: Instant,
    next_minute: Instant,
    seconds: u64,
}

impl Scheduler {
    /// Start both periods at `now`
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            next_second: now + SECOND,
            next_minute: now + MINUTE,
            seconds: 0,
        }
    }

    /// Report which periods are due and advance them
    pub fn poll(&mut self, now: Instant) -> Ticks {
        let mut ticks = Ticks::default();

        if now >= self.next_second {
            ticks.second = true;
            self.seconds += 1;
            self.next_second = advance(self.next_second, SECOND, now);
        }
        if now >= self.next_minute {
            ticks.minute = true;
            self.next_minute = advance(self.next_minute, MINUTE, now);
        }

        ticks
    }

    /// Earliest instant at which [`Scheduler::poll`] reports something
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        self.next_second.min(self.next_minute)
    }

    /// Number of second ticks reported so far
    #[must_use]
    pub fn seconds(&self) -> u64 {
        self.seconds
    }
}

fn advance(deadline: Instant, period: Duration, now: Instant) -> Instant {
    let next = deadline + period;
    if next > now { next } else { now + period }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_and_minute() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new(start);

        assert!(!scheduler.poll(start).any());
        let ticks = scheduler.poll(start + SECOND);
        assert!(ticks.second && !ticks.minute);

        let mut minutes = 0;
        for s in 2..=60 {
            if scheduler.poll(start + SECOND * s).minute {
                minutes += 1;
            }
        }
        assert_eq!(minutes, 1);
        assert_eq!(scheduler.seconds(), 60);
    }

    #[test]
    fn test_no_burst_after_stall() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new(start);
        let late = start + Duration::from_secs(600);

        assert_eq!(
            scheduler.poll(late),
            Ticks {
                second: true,
                minute: true
            }
        );
        assert!(!scheduler.poll(late).any());
        assert_eq!(scheduler.next_deadline(), late + SECOND);
    }

    #[test]
    fn test_polling_before_deadline_is_quiet() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new(start);
        let deadline = scheduler.next_deadline();
        assert_eq!(deadline, start + SECOND);

        for ms in [0, 10, 500, 999] {
            assert!(!scheduler.poll(start + Duration::from_millis(ms)).any());
        }
        assert_eq!(scheduler.next_deadline(), deadline);
        assert!(scheduler.poll(deadline).second);
        assert_eq!(scheduler.next_deadline(), deadline + SECOND);
    }
}
