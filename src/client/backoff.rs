//! Exponential backoff between poll attempts.

use std::time::Duration;

/// Delay state threaded through the polling loop.
///
/// Starts at `initial`, multiplies after every unsuccessful attempt and is
/// clamped at `max`. There is no reset: a run only ever waits longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub const MULTIPLIER: u32 = 2;

    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grow the delay after an attempt that did not produce a final answer.
    /// Returns the new delay.
    pub fn advance(&mut self) -> Duration {
        self.current = self
            .current
            .checked_mul(Self::MULTIPLIER)
            .unwrap_or(self.max)
            .min(self.max);
        self.current
    }
}
