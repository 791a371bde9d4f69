//! Retry policy shared by every retrying caller.
//!
//! The delay schedule is a fixed increasing sequence indexed by the retry
//! count and clamped to its last entry, then capped at `max_delay`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub schedule: Vec<Duration>,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            schedule: [60, 300, 900, 3_600, 21_600]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_delay: Duration::from_secs(21_600),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, schedule: Vec<Duration>, max_delay: Duration) -> Self {
        Self {
            max_retries,
            schedule,
            max_delay,
        }
    }

    /// Build from second-granularity config values.
    pub fn from_secs(max_retries: u32, schedule_secs: &[u64], max_delay_secs: u64) -> Self {
        Self::new(
            max_retries,
            schedule_secs.iter().copied().map(Duration::from_secs).collect(),
            Duration::from_secs(max_delay_secs),
        )
    }

    /// Delay before the retry following `retry_count` earlier retries.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let Some(last) = self.schedule.last() else {
            return Duration::ZERO;
        };
        let idx = retry_count as usize;
        let delay = self.schedule.get(idx).unwrap_or(last);
        (*delay).min(self.max_delay)
    }

    /// Decide after a failure. `retry_count` is the number of retries already
    /// consumed.
    #[must_use]
    pub fn decide(&self, retryable: bool, retry_count: u32) -> RetryDecision {
        if !retryable || retry_count >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_non_decreasing_and_capped() {
        let policy = RetryPolicy::default();
        let mut prev = Duration::ZERO;
        for n in 0..20 {
            let d = policy.delay_for(n);
            assert!(d >= prev, "delay decreased at retry {n}");
            assert!(d <= policy.max_delay);
            prev = d;
        }
        assert_eq!(policy.delay_for(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for(99), Duration::from_secs(21_600));
    }

    #[test]
    fn test_max_delay_caps_schedule() {
        let policy = RetryPolicy::from_secs(3, &[10, 100, 1_000], 50);
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(50));
        assert_eq!(policy.delay_for(7), Duration::from_secs(50));
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::from_secs(2, &[1, 2], 10);
        assert_eq!(
            policy.decide(true, 0),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(policy.decide(true, 2), RetryDecision::GiveUp);
        assert_eq!(policy.decide(false, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_empty_schedule() {
        let policy = RetryPolicy::new(1, vec![], Duration::from_secs(5));
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }
}
