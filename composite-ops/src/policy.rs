//! Polling cadence for wait loops.
//!
//! Polling uses truncated exponential backoff without jitter: the delay
//! starts at the initial interval, doubles after every poll, and is capped at
//! the maximum interval. A delay never extends past the remaining total wait.

use std::time::Duration;

use crate::error::PolicyError;

/// Delay before the second poll.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);

/// Cap on the delay between two polls.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Cap on the total time spent polling.
pub const DEFAULT_MAX_TOTAL_WAIT: Duration = Duration::from_secs(1200);

/// Interval and total-wait caps for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    initial_interval: Duration,
    max_interval: Duration,
    max_total_wait: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_total_wait: DEFAULT_MAX_TOTAL_WAIT,
        }
    }
}

impl PollingPolicy {
    /// Create a policy with the given caps.
    ///
    /// The initial interval is the default one, lowered to `max_interval`
    /// when the cap is smaller.
    pub fn new(max_interval: Duration, max_total_wait: Duration) -> Result<Self, PolicyError> {
        Self::with_intervals(
            DEFAULT_INITIAL_INTERVAL.min(max_interval),
            max_interval,
            max_total_wait,
        )
    }

    /// Create a policy with an explicit initial interval.
    pub fn with_intervals(
        initial_interval: Duration,
        max_interval: Duration,
        max_total_wait: Duration,
    ) -> Result<Self, PolicyError> {
        // Caps first: `new` derives the initial interval from `max_interval`
        if max_interval.is_zero() {
            return Err(PolicyError::NotPositive {
                field: "max_interval",
            });
        }
        if max_total_wait.is_zero() {
            return Err(PolicyError::NotPositive {
                field: "max_total_wait",
            });
        }
        if initial_interval.is_zero() {
            return Err(PolicyError::NotPositive {
                field: "initial_interval",
            });
        }
        if initial_interval > max_interval {
            return Err(PolicyError::InitialExceedsMax {
                initial: initial_interval,
                max: max_interval,
            });
        }
        Ok(Self {
            initial_interval,
            max_interval,
            max_total_wait,
        })
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn max_total_wait(&self) -> Duration {
        self.max_total_wait
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_interval,
            max: self.max_interval,
        }
    }
}

/// Delay sequence for one wait loop.
#[derive(Debug)]
pub(crate) struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    /// Delay before the next poll, clipped to `remaining`.
    pub(crate) fn next_delay(&mut self, remaining: Duration) -> Duration {
        let delay = self.next.min(remaining);
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}
