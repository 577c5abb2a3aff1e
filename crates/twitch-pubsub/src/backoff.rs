//! Reconnect delay policy.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff between reconnect attempts.
///
/// The delay starts at a floor, doubles on every failed attempt up to a
/// ceiling, and resets to the floor after any successful connection. A small
/// random jitter is added to each delay so that many clients recovering from
/// the same outage do not reconnect in lockstep.
#[derive(Debug)]
pub(crate) struct Backoff {
    floor: Duration,
    ceiling: Duration,
    max_jitter: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(floor: Duration, ceiling: Duration, max_jitter: Duration) -> Self {
        Self {
            floor,
            ceiling,
            max_jitter,
            current: floor,
        }
    }

    /// Reset the delay to the floor. Called after every successful connect.
    pub(crate) fn reset(&mut self) {
        self.current = self.floor;
    }

    /// The delay to wait before the next attempt. Doubles the base delay
    /// afterwards, capped at the ceiling.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let micros = self.max_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..micros))
        };
        let delay = self.current + jitter;
        self.current = (self.current * 2).min(self.ceiling);
        delay
    }
}
