use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure reason reported by a tool invoker or assigned by
/// the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The attempt exceeded its per-task timeout.
    Timeout,
    /// The tool or its backend is temporarily unavailable.
    Unavailable,
    RateLimited,
    Network,
    /// The tool ran and reported a generic execution failure.
    Execution,
    InvalidParameters,
    Unauthorized,
    UnknownTool,
    /// An external stop request or cancellation grace expiry.
    Cancelled,
    /// A dependency ended FAILED or SKIPPED.
    DependencyFailed,
    /// The plan-level deadline expired before the task could run.
    PlanTimeout,
    /// The plan stopped dispatching after too many failures.
    PlanAborted,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::Execution => "execution",
            Self::InvalidParameters => "invalid_parameters",
            Self::Unauthorized => "unauthorized",
            Self::UnknownTool => "unknown_tool",
            Self::Cancelled => "cancelled",
            Self::DependencyFailed => "dependency_failed",
            Self::PlanTimeout => "plan_timeout",
            Self::PlanAborted => "plan_aborted",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified task failure. Recorded in outcomes, never raised out of the
/// scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,

    /// Invoker hint for the earliest sensible retry.
    #[serde(
        default,
        rename = "retry_after_ms",
        with = "super::serde_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<Duration>,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("timed out after {}ms", after.as_millis()),
        )
    }

    pub fn unknown_tool(tool_name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: {tool_name}"))
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, reason)
    }

    pub fn dependency_failed(dep_id: &str, dep_status: super::TaskStatus) -> Self {
        Self::new(
            ErrorKind::DependencyFailed,
            format!("dependency '{dep_id}' ended {dep_status}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let err = TaskError::unknown_tool("teleport");
        assert_eq!(err.to_string(), "unknown_tool: unknown tool: teleport");
    }

    #[test]
    fn retry_hint_serialises_as_millis() {
        let err = TaskError::new(ErrorKind::RateLimited, "slow down")
            .with_retry_after(Duration::from_millis(750));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "rate_limited");
        assert_eq!(value["retry_after_ms"], 750);
    }
}
