use thiserror::Error;

use super::code::ErrorCode;

/// Errors surfaced by the scheduler entry point.
///
/// Everything here is either a malformed plan (rejected before any task runs)
/// or caller misuse. Individual task failures are never reported through this
/// type; they are recorded as data in the task outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Invalid execution order: {0}")]
    InvalidExecutionOrder(String),

    #[error("Too many tasks in plan: {count} (limit: {limit})")]
    TooManyTasks { count: usize, limit: usize },

    #[error("Invalid concurrency bound: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

impl ExecutorError {
    /// True for the malformed-plan family, false for caller misuse.
    pub fn is_malformed_plan(&self) -> bool {
        !matches!(self, Self::InvalidConcurrency(_) | Self::InvalidTimeout(_))
    }

    /// Map executor error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTaskId(_) => ErrorCode::ValidationError,
            Self::DependencyNotFound { .. } => ErrorCode::DependencyError,
            Self::CircularDependency(_) => ErrorCode::CircularDependency,
            Self::InvalidExecutionOrder(_) => ErrorCode::ValidationError,
            Self::TooManyTasks { .. } => ErrorCode::ValidationError,
            Self::InvalidConcurrency(_) => ErrorCode::ConfigError,
            Self::InvalidTimeout(_) => ErrorCode::ConfigError,
        }
    }
}
