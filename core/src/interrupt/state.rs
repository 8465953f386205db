use std::time::{Duration, Instant};

use super::context::InterruptContext;

/// Context plus the debounced CTRL+C counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptState {
    pub context: InterruptContext,
    pub count: u32,
    pub last_signal: Option<Instant>,
    pub reset_timeout: Duration,
}

impl InterruptState {
    pub fn new(reset_timeout: Duration) -> Self {
        Self {
            context: InterruptContext::Idle,
            count: 0,
            last_signal: None,
            reset_timeout,
        }
    }

    /// Counts one signal delivered at `now` and returns the new count.
    ///
    /// A signal arriving more than `reset_timeout` after the previous one
    /// starts a fresh sequence.
    pub fn record_signal(&mut self, now: Instant) -> u32 {
        if let Some(last) = self.last_signal {
            if now.saturating_duration_since(last) > self.reset_timeout {
                self.count = 0;
            }
        }
        self.count = self.count.saturating_add(1);
        self.last_signal = Some(now);
        self.count
    }

    pub fn reset_count(&mut self) {
        self.count = 0;
    }
}
