use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::executor::types::{ErrorKind, TaskError};

/// Structured lifecycle event emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub plan_id: String,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    PlanStart {
        total_tasks: usize,
        parallel_groups: Vec<Vec<String>>,
        max_concurrency: usize,
    },
    TaskReady {
        task_id: String,
    },
    TaskDispatched {
        task_id: String,
        attempt: u32,
    },
    TaskRetrying {
        task_id: String,
        attempt: u32,
        delay: Duration,
        error: TaskError,
    },
    TaskSucceeded {
        task_id: String,
        attempt: u32,
        duration: Duration,
    },
    TaskFailed {
        task_id: String,
        attempt: u32,
        duration: Duration,
        error: TaskError,
    },
    TaskSkipped {
        task_id: String,
        reason: TaskError,
    },
    PlanCancelled {
        reason: ErrorKind,
        running: usize,
    },
    PlanEnd {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
}

impl EventKind {
    /// Dotted event name used by renderers, e.g. `task.dispatched`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlanStart { .. } => "plan.start",
            Self::TaskReady { .. } => "task.ready",
            Self::TaskDispatched { .. } => "task.dispatched",
            Self::TaskRetrying { .. } => "task.retrying",
            Self::TaskSucceeded { .. } => "task.succeeded",
            Self::TaskFailed { .. } => "task.failed",
            Self::TaskSkipped { .. } => "task.skipped",
            Self::PlanCancelled { .. } => "plan.cancelled",
            Self::PlanEnd { .. } => "plan.end",
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskReady { task_id }
            | Self::TaskDispatched { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::TaskSucceeded { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskSkipped { task_id, .. } => Some(task_id),
            Self::PlanStart { .. } | Self::PlanCancelled { .. } | Self::PlanEnd { .. } => None,
        }
    }
}

/// Observability hook: anything that can accept lifecycle events.
///
/// Called from the scheduler's coordinating loop; implementations must not
/// block for long.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    fn accept(&self, event: &LifecycleEvent);
}
