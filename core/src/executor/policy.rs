use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FailureConfig, RetryConfig};

use super::traits::{ExponentialBackoff, RetryStrategyPlugin};
use super::types::{ErrorKind, TaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient: another attempt may succeed.
    Retryable,
    /// Permanent: further attempts are pointless.
    Fatal,
}

/// Classification of one error signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: FailureClass,
    /// Suggested wait before the next attempt; `None` for fatal errors.
    pub retry_delay: Option<Duration>,
}

/// What the scheduler does with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Retry { delay: Duration },
    Fail,
}

/// Classifies task failures and decides plan-level continuation.
///
/// Holds configuration only; every method is a pure function of its
/// arguments.
#[derive(Clone)]
pub struct FailurePolicy {
    max_retries: u32,
    max_delay: Duration,
    strategy: Arc<dyn RetryStrategyPlugin>,
    max_failure_ratio: Option<f64>,
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailurePolicy")
            .field("max_retries", &self.max_retries)
            .field("max_delay", &self.max_delay)
            .field("strategy", &self.strategy.name())
            .field("max_failure_ratio", &self.max_failure_ratio)
            .finish()
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl FailurePolicy {
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            max_retries: retry.max_retries,
            max_delay: Duration::from_millis(retry.max_delay_ms),
            strategy: Arc::new(ExponentialBackoff::from_config(retry)),
            max_failure_ratio: None,
        }
    }

    pub fn from_config(retry: &RetryConfig, failure: &FailureConfig) -> Self {
        Self::new(retry).with_max_failure_ratio(failure.max_failure_ratio)
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_failure_ratio(mut self, ratio: Option<f64>) -> Self {
        self.max_failure_ratio = ratio;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Transient kinds are retryable; everything else is fatal.
    pub fn class_of(kind: ErrorKind) -> FailureClass {
        match kind {
            ErrorKind::Timeout
            | ErrorKind::Unavailable
            | ErrorKind::RateLimited
            | ErrorKind::Network
            | ErrorKind::Execution => FailureClass::Retryable,
            ErrorKind::InvalidParameters
            | ErrorKind::Unauthorized
            | ErrorKind::UnknownTool
            | ErrorKind::Cancelled
            | ErrorKind::DependencyFailed
            | ErrorKind::PlanTimeout
            | ErrorKind::PlanAborted
            | ErrorKind::Internal => FailureClass::Fatal,
        }
    }

    /// Classify `error` after `attempt_count` attempts, ignoring the budget.
    pub fn classify(&self, error: &TaskError, attempt_count: u32) -> Classification {
        match Self::class_of(error.kind) {
            FailureClass::Fatal => Classification {
                class: FailureClass::Fatal,
                retry_delay: None,
            },
            FailureClass::Retryable => {
                let backoff = self.strategy.next_delay(attempt_count.max(1));
                let delay = error
                    .retry_after
                    .map_or(backoff, |hint| hint.max(backoff))
                    .min(self.max_delay);
                Classification {
                    class: FailureClass::Retryable,
                    retry_delay: Some(delay),
                }
            }
        }
    }

    /// Retry while the error is retryable and fewer than `max_retries`
    /// retries have been used.
    pub fn decide(&self, error: &TaskError, attempt_count: u32) -> FailureDecision {
        let retries_used = attempt_count.saturating_sub(1);
        if retries_used >= self.max_retries {
            return FailureDecision::Fail;
        }
        match self.classify(error, attempt_count) {
            Classification {
                class: FailureClass::Retryable,
                retry_delay: Some(delay),
            } => FailureDecision::Retry { delay },
            _ => FailureDecision::Fail,
        }
    }

    /// Whether the plan keeps dispatching after `failed` of `total` tasks failed.
    pub fn should_continue(&self, failed: usize, total: usize) -> bool {
        match self.max_failure_ratio {
            Some(ratio) if total > 0 => (failed as f64 / total as f64) <= ratio,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FailurePolicy {
        FailurePolicy::new(&RetryConfig {
            strategy: "exponential-backoff".to_string(),
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_retries: 3,
        })
    }

    #[test]
    fn test_transient_kinds_are_retryable() {
        for kind in [
            ErrorKind::Timeout,
            ErrorKind::Unavailable,
            ErrorKind::RateLimited,
            ErrorKind::Network,
            ErrorKind::Execution,
        ] {
            assert_eq!(FailurePolicy::class_of(kind), FailureClass::Retryable, "{kind}");
        }
    }

    #[test]
    fn test_permanent_kinds_are_fatal() {
        let p = policy();
        for kind in [
            ErrorKind::InvalidParameters,
            ErrorKind::Unauthorized,
            ErrorKind::UnknownTool,
            ErrorKind::Cancelled,
        ] {
            let err = TaskError::new(kind, "boom");
            assert_eq!(
                p.classify(&err, 1),
                Classification {
                    class: FailureClass::Fatal,
                    retry_delay: None
                }
            );
            // Fatal ignores the remaining budget.
            assert_eq!(p.decide(&err, 1), FailureDecision::Fail);
        }
    }

    #[test]
    fn test_delay_doubles_and_is_bounded() {
        let p = policy();
        let err = TaskError::new(ErrorKind::Unavailable, "503");
        let delays: Vec<_> = (1..=6)
            .map(|attempt| p.classify(&err, attempt).retry_delay.unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_retry_after_hint_raises_delay_but_stays_capped() {
        let p = policy();
        let hinted = TaskError::new(ErrorKind::RateLimited, "429")
            .with_retry_after(Duration::from_millis(600));
        assert_eq!(p.classify(&hinted, 1).retry_delay, Some(Duration::from_millis(600)));

        let huge = TaskError::new(ErrorKind::RateLimited, "429")
            .with_retry_after(Duration::from_secs(60));
        assert_eq!(p.classify(&huge, 1).retry_delay, Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn test_budget_exhaustion() {
        let p = policy();
        let err = TaskError::new(ErrorKind::Timeout, "slow");
        assert!(matches!(p.decide(&err, 1), FailureDecision::Retry { .. }));
        assert!(matches!(p.decide(&err, 3), FailureDecision::Retry { .. }));
        assert_eq!(p.decide(&err, 4), FailureDecision::Fail);

        let no_retries = policy().with_max_retries(0);
        assert_eq!(no_retries.decide(&err, 1), FailureDecision::Fail);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let p = policy();
        let err = TaskError::new(ErrorKind::Network, "reset");
        assert_eq!(p.classify(&err, 2), p.classify(&err, 2));
    }

    #[test]
    fn test_should_continue() {
        let p = policy();
        assert!(p.should_continue(10, 10));

        let strict = policy().with_max_failure_ratio(Some(0.5));
        assert!(strict.should_continue(2, 4));
        assert!(!strict.should_continue(3, 4));
        assert!(strict.should_continue(0, 0));
    }
}
