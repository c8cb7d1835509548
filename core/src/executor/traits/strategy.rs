use std::time::Duration;

use crate::config::RetryConfig;

/// Retry backoff strategy plugin.
///
/// `attempt` is the number of attempts already made (1 after the first
/// failure). Implementations must be pure functions of their input.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// `base * 2^(attempt - 1)`, capped at `max_delay`; the built-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

impl RetryStrategyPlugin for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_bounded() {
        let backoff = ExponentialBackoff::from_config(&RetryConfig {
            strategy: "exponential-backoff".to_string(),
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_retries: 3,
        });
        assert_eq!(backoff.next_delay(1), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(2), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(4), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(5), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(64), Duration::from_millis(1000));
    }
}
