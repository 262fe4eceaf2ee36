//! Sliding-window replay protection for channel records.
//!
//! The datagram layer delivers at least once and in any order, so a receiver
//! tracks the highest counter seen plus a bitmap of the `WINDOW_SIZE`
//! counters below it. Anything older than the window, or already marked,
//! is rejected.

/// Number of counters tracked below the highest one seen.
pub const WINDOW_SIZE: u64 = 128;

/// Replay window over 64-bit record counters.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    highest: Option<u64>,
    bitmap: u128,
}

impl ReplayWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `counter` would be accepted, without recording it.
    #[must_use]
    pub fn check(&self, counter: u64) -> bool {
        let Some(highest) = self.highest else {
            return true;
        };

        if counter > highest {
            return true;
        }

        let behind = highest - counter;
        if behind >= WINDOW_SIZE {
            return false;
        }
        self.bitmap & (1u128 << behind) == 0
    }

    /// Record `counter` as seen. Call only after the record authenticated.
    pub fn commit(&mut self, counter: u64) {
        match self.highest {
            None => {
                self.highest = Some(counter);
                self.bitmap = 1;
            }
            Some(highest) if counter > highest => {
                let shift = counter - highest;
                self.bitmap = if shift >= WINDOW_SIZE {
                    0
                } else {
                    self.bitmap << shift
                };
                self.bitmap |= 1;
                self.highest = Some(counter);
            }
            Some(highest) => {
                let behind = highest - counter;
                if behind < WINDOW_SIZE {
                    self.bitmap |= 1u128 << behind;
                }
            }
        }
    }

    /// Highest counter committed so far.
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.highest
    }
}
