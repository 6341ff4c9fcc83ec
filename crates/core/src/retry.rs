//! Delivery retry policy for outbound webhooks.
//!
//! A delivery attempt is classified from its HTTP status (or transport
//! failure) and the policy decides whether the row is finished, retried
//! after a backoff delay, or given up on. The schedule is durable: the
//! delay is written to `next_retry_at` and the retry poller picks the row
//! up again, so retries survive restarts.

use std::time::Duration;

/// Backoff delays between attempts: 1 min, 5 min, 30 min, 2 h, 12 h.
pub const DEFAULT_BACKOFF_SECS: [u64; 5] = [60, 300, 1_800, 7_200, 43_200];

/// Total attempts (first delivery plus retries) before giving up.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 6;

/// How a single attempt went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    /// 2xx response.
    Success,
    /// Network failure, timeout, 408, 429 or 5xx.
    Retryable,
    /// Any other status: the receiver rejected the payload.
    Permanent,
}

impl AttemptClass {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            408 | 429 | 500..=599 => Self::Retryable,
            _ => Self::Permanent,
        }
    }
}

/// What to do with the row after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Delivered,
    RetryIn(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts were made.
    /// The last schedule entry repeats once the schedule is exhausted.
    pub fn delay_after(&self, attempts_made: i32) -> Duration {
        let Some(last) = self.backoff_secs.last() else {
            return Duration::ZERO;
        };
        let idx = usize::try_from(attempts_made.max(1) - 1).unwrap_or(0);
        let secs = self.backoff_secs.get(idx).unwrap_or(last);
        Duration::from_secs(*secs)
    }

    /// Decide the next step. `attempts_made` includes the attempt that was
    /// just classified; `max_attempts` is the row's own limit.
    pub fn decide(
        &self,
        class: AttemptClass,
        attempts_made: i32,
        max_attempts: i32,
    ) -> RetryDecision {
        match class {
            AttemptClass::Success => RetryDecision::Delivered,
            AttemptClass::Permanent => RetryDecision::GiveUp,
            AttemptClass::Retryable if attempts_made >= max_attempts => RetryDecision::GiveUp,
            AttemptClass::Retryable => RetryDecision::RetryIn(self.delay_after(attempts_made)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(AttemptClass::from_status(200), AttemptClass::Success);
        assert_eq!(AttemptClass::from_status(204), AttemptClass::Success);
        assert_eq!(AttemptClass::from_status(408), AttemptClass::Retryable);
        assert_eq!(AttemptClass::from_status(429), AttemptClass::Retryable);
        assert_eq!(AttemptClass::from_status(502), AttemptClass::Retryable);
        assert_eq!(AttemptClass::from_status(400), AttemptClass::Permanent);
        assert_eq!(AttemptClass::from_status(410), AttemptClass::Permanent);
        assert_eq!(AttemptClass::from_status(301), AttemptClass::Permanent);
    }

    #[test]
    fn backoff_follows_schedule_then_repeats_last() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(60));
        assert_eq!(policy.delay_after(2), Duration::from_secs(300));
        assert_eq!(policy.delay_after(5), Duration::from_secs(43_200));
        assert_eq!(policy.delay_after(9), Duration::from_secs(43_200));
        assert_eq!(policy.delay_after(0), Duration::from_secs(60));
    }

    #[test]
    fn retryable_failure_retries_until_limit() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(AttemptClass::Retryable, 1, 6),
            RetryDecision::RetryIn(Duration::from_secs(60))
        );
        assert_eq!(policy.decide(AttemptClass::Retryable, 6, 6), RetryDecision::GiveUp);
    }

    #[test]
    fn permanent_failure_gives_up_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(AttemptClass::Permanent, 1, 6), RetryDecision::GiveUp);
    }

    #[test]
    fn success_is_delivered() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(AttemptClass::Success, 3, 6), RetryDecision::Delivered);
    }

    #[test]
    fn empty_schedule_retries_without_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_secs: Vec::new(),
        };
        assert_eq!(policy.delay_after(2), Duration::ZERO);
    }
}
