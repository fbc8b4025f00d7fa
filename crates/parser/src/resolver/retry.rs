//! Bounded exponential backoff as an explicit state machine
//!
//! ```text
//! Idle ──start──▶ Attempting ──success──▶ Succeeded
//!                   │    ▲
//!           failure │    │ resume
//!                   ▼    │
//!                 BackingOff        (no attempts left / permanent) ──▶ Failed
//! ```
//!
//! The machine only computes delays; the caller decides how to wait, so
//! transitions can be tested without timers.

use crate::config::RetryOptions;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `min * factor^retry`,
    /// capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.min_delay.as_millis() as f64 * self.factor.max(1.0).powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl From<&RetryOptions> for RetryPolicy {
    fn from(options: &RetryOptions) -> Self {
        Self {
            max_attempts: options.max_attempts.max(1),
            min_delay: Duration::from_millis(options.min_delay_ms),
            max_delay: Duration::from_millis(options.max_delay_ms),
            factor: options.factor,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryOptions::default())
    }
}

/// Current phase of a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

/// Drives one fetch through its attempts
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Begin the first attempt
    pub fn start(&mut self) -> u32 {
        self.state = RetryState::Attempting { attempt: 1 };
        1
    }

    /// The in-flight attempt succeeded
    pub fn record_success(&mut self) {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = RetryState::Succeeded { attempts: attempt };
        }
    }

    /// The in-flight attempt failed
    ///
    /// Returns the delay to wait before the next attempt, or `None` when the
    /// machine has moved to `Failed` (attempts exhausted or permanent error).
    pub fn record_failure(&mut self, transient: bool) -> Option<Duration> {
        let RetryState::Attempting { attempt } = self.state else {
            return None;
        };
        if !transient || attempt >= self.policy.max_attempts {
            self.state = RetryState::Failed { attempts: attempt };
            return None;
        }
        let delay = self.policy.delay_for(attempt - 1);
        self.state = RetryState::BackingOff { attempt, delay };
        Some(delay)
    }

    /// Leave `BackingOff` and begin the next attempt
    pub fn resume(&mut self) -> Option<u32> {
        let RetryState::BackingOff { attempt, .. } = self.state else {
            return None;
        };
        let next = attempt + 1;
        self.state = RetryState::Attempting { attempt: next };
        Some(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RetryState::Succeeded { .. } | RetryState::Failed { .. }
        )
    }
}
