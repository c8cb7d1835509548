use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskplan_core::api::{ErrorKind, Parameters, TaskError};
use tokio_util::sync::CancellationToken;

use super::registry::Tool;

/// Returns its parameters unchanged.
pub struct EchoTool;

/// Waits `ms` milliseconds, returning early with `cancelled` when asked to stop.
pub struct SleepTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the task parameters as the result"
    }

    async fn call(
        &self,
        parameters: &Parameters,
        _cancel: CancellationToken,
    ) -> Result<Value, TaskError> {
        requested_failure(parameters)?;
        Ok(json!({ "echo": parameters }))
    }
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleep for `ms` milliseconds"
    }

    async fn call(
        &self,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, TaskError> {
        let ms = parameters
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                TaskError::new(
                    ErrorKind::InvalidParameters,
                    "sleep requires a non-negative integer `ms`",
                )
            })?;

        tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::cancelled("sleep interrupted")),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }

        requested_failure(parameters)?;
        Ok(json!({ "slept_ms": ms }))
    }
}

/// Demo hook: a `fail` parameter naming an error kind makes the tool fail
/// with that kind, honouring an optional `retry_after_ms`.
fn requested_failure(parameters: &Parameters) -> Result<(), TaskError> {
    let Some(kind) = parameters.get("fail") else {
        return Ok(());
    };
    let kind: ErrorKind = serde_json::from_value(kind.clone()).map_err(|_| {
        TaskError::new(
            ErrorKind::InvalidParameters,
            format!("unknown failure kind: {kind}"),
        )
    })?;

    let mut error = TaskError::new(kind, "failure requested by task parameters");
    if let Some(ms) = parameters.get("retry_after_ms").and_then(Value::as_u64) {
        error = error.with_retry_after(Duration::from_millis(ms));
    }
    Err(error)
}
