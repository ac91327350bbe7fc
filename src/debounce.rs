//! Save debouncing.
//!
//! Geometry and collapse changes arrive in bursts during a drag. The
//! debouncer only reports "save now" once input has gone quiet for the
//! configured interval.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SaveDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, deadline: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record a change, pushing the deadline out.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once per quiet period.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop a pending save, e.g. because it is being flushed directly.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
