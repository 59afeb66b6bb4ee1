//! Join retry backoff.

use std::time::Duration;

/// Wait schedule of the join loop.
///
/// The first `retry_times` failed rounds keep the initial wait; every round
/// after that doubles it, up to `max_wait`. The loop itself never gives up.
#[derive(Debug, Clone)]
pub struct JoinBackoff {
    wait: Duration,
    max_wait: Duration,
    retry_times: u32,
    failed_rounds: u32,
}

impl JoinBackoff {
    pub fn new(initial: Duration, max_wait: Duration, retry_times: u32) -> Self {
        Self {
            wait: initial.min(max_wait),
            max_wait,
            retry_times,
            failed_rounds: 0,
        }
    }

    /// How long the current round waits for a bootstrap response.
    pub fn current_wait(&self) -> Duration {
        self.wait
    }

    pub fn failed_rounds(&self) -> u32 {
        self.failed_rounds
    }

    /// Record a timed-out round and return the wait of the next one.
    pub fn on_round_failed(&mut self) -> Duration {
        self.failed_rounds = self.failed_rounds.saturating_add(1);
        if self.failed_rounds > self.retry_times {
            self.wait = (self.wait * 2).min(self.max_wait);
        }
        self.wait
    }
}
