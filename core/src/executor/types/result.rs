use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TaskError;
use super::task::TaskStatus;

/// Terminal record of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,

    /// One of SUCCEEDED, FAILED, SKIPPED.
    pub status: TaskStatus,

    /// Opaque payload from the tool invoker on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,

    /// Time from first dispatch to the terminal transition; zero when never run.
    #[serde(rename = "duration_ms", with = "super::serde_ms")]
    pub duration: Duration,

    pub attempt_count: u32,

    /// First dispatch; `None` for tasks that never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Overall quality of an aggregated run, used downstream to decide whether
/// the final response must be degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySignal {
    /// Every task succeeded.
    Complete,
    /// Some tasks succeeded, some did not.
    Partial,
    /// Nothing succeeded.
    Failed,
    /// The plan had no tasks.
    Empty,
}

/// Ordered, de-duplicated outcome set for the next pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub plan_id: String,

    /// Outcomes in the plan's `execution_order`.
    pub outcomes: Vec<TaskOutcome>,

    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Succeeded / total, 0.0 for an empty plan.
    pub success_rate: f64,

    /// Earliest dispatch to latest terminal transition.
    #[serde(rename = "duration_ms", with = "super::serde_ms")]
    pub duration: Duration,

    pub quality: QualitySignal,
}

/// A successful outcome paired with the task's description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyResult<'a> {
    pub task_id: &'a str,
    pub description: &'a str,
    pub result: Option<&'a Value>,
    #[serde(rename = "duration_ms", with = "super::serde_ms")]
    pub duration: Duration,
}

/// A failed outcome paired with the task's description and error text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary<'a> {
    pub task_id: &'a str,
    pub description: &'a str,
    pub error: String,
}

impl AggregatedResult {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.outcome(task_id).map(|o| o.status)
    }

    pub fn all_succeeded(&self) -> bool {
        self.quality == QualitySignal::Complete
    }
}
