use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::error::ExecutorError;

/// Runtime options for one scheduler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOpts {
    /// Maximum simultaneously running tasks (`C`).
    pub max_concurrency: usize,

    /// Per-attempt timeout.
    pub task_timeout: Duration,

    /// Wall-clock budget for the whole plan, measured from the first dispatch.
    pub plan_deadline: Option<Duration>,

    /// How long running tasks may take to honour cancellation before they are
    /// abandoned and marked failed.
    pub cancel_grace: Duration,

    /// Intake limit on plan size.
    pub max_tasks: usize,
}

impl Default for ExecutionOpts {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl ExecutionOpts {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            max_concurrency: cfg.max_concurrency,
            task_timeout: Duration::from_millis(cfg.task_timeout_ms),
            plan_deadline: cfg.plan_deadline_ms.map(Duration::from_millis),
            cancel_grace: Duration::from_millis(cfg.cancel_grace_ms),
            max_tasks: cfg.max_tasks,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_plan_deadline(mut self, deadline: Duration) -> Self {
        self.plan_deadline = Some(deadline);
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Reject option sets the scheduler cannot honour.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.max_concurrency == 0 {
            return Err(ExecutorError::InvalidConcurrency(self.max_concurrency));
        }
        if self.task_timeout.is_zero() {
            return Err(ExecutorError::InvalidTimeout(
                "task timeout must be greater than zero".to_string(),
            ));
        }
        if self.plan_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ExecutorError::InvalidTimeout(
                "plan deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_scheduler_config() {
        let opts = ExecutionOpts::default();
        assert_eq!(opts.max_concurrency, 5);
        assert_eq!(opts.task_timeout, Duration::from_secs(120));
        assert_eq!(opts.cancel_grace, Duration::from_secs(5));
        assert!(opts.plan_deadline.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_misuse() {
        let opts = ExecutionOpts::default().with_max_concurrency(0);
        assert_eq!(opts.validate(), Err(ExecutorError::InvalidConcurrency(0)));
    }

    #[test]
    fn zero_timeouts_are_misuse() {
        let opts = ExecutionOpts::default().with_task_timeout(Duration::ZERO);
        assert!(matches!(opts.validate(), Err(ExecutorError::InvalidTimeout(_))));

        let opts = ExecutionOpts::default().with_plan_deadline(Duration::ZERO);
        assert!(matches!(opts.validate(), Err(ExecutorError::InvalidTimeout(_))));
    }
}
