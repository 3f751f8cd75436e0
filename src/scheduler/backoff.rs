//! Backoff policy for rate-limited polls.
//!
//! When the portal answers 429 the watch for that request waits before its
//! next poll. The wait starts at a first penalty and doubles on every
//! consecutive rate-limit hit; any other result resets it. Once the wait grows
//! past the escalation ceiling an operator notification is due, but the watch
//! keeps going.

use std::time::Duration;

/// One minute
pub const DEFAULT_FIRST_PENALTY: Duration = Duration::from_secs(60);

/// One day
pub const DEFAULT_ESCALATION_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of applying the policy to one poll outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffDecision {
    /// Delay before the next poll (zero = reset)
    pub delay: Duration,
    /// Delay exceeded the escalation ceiling
    pub escalate: bool,
}

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first rate-limit hit.
    pub first_penalty: Duration,
    /// Delays above this trigger an escalation notification.
    pub escalation_ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first_penalty: DEFAULT_FIRST_PENALTY,
            escalation_ceiling: DEFAULT_ESCALATION_CEILING,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with custom values.
    pub fn new(first_penalty: Duration, escalation_ceiling: Duration) -> Self {
        Self {
            first_penalty,
            escalation_ceiling,
        }
    }

    /// Compute the delay that follows `current` given whether the last poll
    /// was rate limited.
    pub fn next_delay(&self, current: Duration, rate_limited: bool) -> BackoffDecision {
        if !rate_limited {
            return BackoffDecision {
                delay: Duration::ZERO,
                escalate: false,
            };
        }

        let delay = if current.is_zero() {
            self.first_penalty
        } else {
            current.saturating_mul(2)
        };

        BackoffDecision {
            delay,
            escalate: delay > self.escalation_ceiling,
        }
    }
}
