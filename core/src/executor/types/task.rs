use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named arguments handed verbatim to the tool invoker.
pub type Parameters = Map<String, Value>;

/// Priority given to tasks that do not declare one (MEDIUM on the 1..=4 scale).
pub const DEFAULT_PRIORITY: i32 = 2;

/// Lifecycle of a task inside one plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,

    /// Human-readable intent; never interpreted by the scheduler.
    #[serde(default)]
    pub description: String,

    /// Key of the collaborator that performs the work.
    pub tool_name: String,

    #[serde(default)]
    pub parameters: Parameters,

    /// Tasks that must succeed before this one may run.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Higher runs first among simultaneously ready tasks.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Advisory only; feeds the timeout heuristic.
    #[serde(
        default,
        rename = "estimated_duration_ms",
        with = "super::serde_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_duration: Option<Duration>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub attempt_count: u32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tool_name: tool_name.into(),
            parameters: Parameters::new(),
            dependencies: Vec::new(),
            priority: DEFAULT_PRIORITY,
            estimated_duration: None,
            status: TaskStatus::Pending,
            attempt_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_estimated_duration(mut self, estimate: Duration) -> Self {
        self.estimated_duration = Some(estimate);
        self
    }
}

/// Common task interface for executor graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

impl TaskLike for TaskDescriptor {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
