//! Reconnect delay sequence - capped exponential backoff with optional jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter strategy applied to each delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Always return the capped exponential delay
    None,
    /// Return a random delay in `[0, capped_delay]`
    #[default]
    Full,
}

/// Reconnection policy for abnormal closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// First delay in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any delay in milliseconds
    pub max_delay_ms: u64,

    /// Retry budget (0 = unlimited)
    #[serde(default)]
    pub max_attempts: u32,

    #[serde(default)]
    pub jitter: Jitter,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 3_000,
            max_delay_ms: 60_000,
            max_attempts: 0,
            jitter: Jitter::Full,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed, non-growing delay with an unlimited budget
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            base_delay_ms: ms,
            max_delay_ms: ms,
            max_attempts: 0,
            jitter: Jitter::None,
        }
    }

    /// Limit the number of consecutive attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Build the delay sequence for this policy
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            jitter: self.jitter,
            attempt: 0,
        }
    }
}

/// Stateful delay generator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: Jitter,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Next delay, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        // min(base * 2^attempt, max)
        let base_ms = self.base_delay.as_millis();
        let max_ms = self.max_delay.as_millis();
        let multiplier = 1u128.checked_shl(self.attempt.min(63)).unwrap_or(u128::MAX);
        let capped_ms = base_ms.saturating_mul(multiplier).min(max_ms);

        let delay_ms = match self.jitter {
            Jitter::None => capped_ms,
            Jitter::Full => {
                let capped = capped_ms.min(u64::MAX as u128) as u64;
                rand::thread_rng().gen_range(0..=capped) as u128
            }
        };

        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_millis(delay_ms.min(u64::MAX as u128) as u64))
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts.map_or(false, |max| self.attempt >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy_never_grows() {
        let mut backoff = ReconnectPolicy::fixed(Duration::from_secs(3)).backoff();
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(3)));
        }
        assert!(!backoff.is_exhausted());
    }

    #[test]
    fn test_exponential_without_jitter() {
        let policy = ReconnectPolicy {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_attempts: 5,
            jitter: Jitter::None,
        };
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1_000)));
        assert_eq!(backoff.next_delay(), None);
        assert!(backoff.is_exhausted());
    }

    #[test]
    fn test_default_policy_first_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.jitter, Jitter::Full);
        assert_eq!(policy.max_attempts, 0);

        for _ in 0..50 {
            let mut backoff = policy.backoff();
            let first = backoff.next_delay().unwrap();
            assert!(first <= Duration::from_secs(3));
            let second = backoff.next_delay().unwrap();
            assert!(second <= Duration::from_secs(6));
        }
    }

    #[test]
    fn test_full_jitter_stays_under_cap() {
        let mut backoff = ReconnectPolicy::default().backoff();
        for _ in 0..20 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = ReconnectPolicy {
            jitter: Jitter::None,
            ..Default::default()
        }
        .backoff();

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(3)).with_max_attempts(4);
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"baseDelayMs\":3000"));
        assert!(json.contains("\"maxAttempts\":4"));
        assert!(json.contains("\"jitter\":\"none\""));

        let parsed: ReconnectPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }
}
