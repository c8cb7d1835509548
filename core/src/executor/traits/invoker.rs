use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::executor::types::{Parameters, TaskError};

/// Performs the actual work of a task.
///
/// Implementations may be slow or unreliable. They are expected to watch
/// `cancel` and return promptly once it fires; the scheduler abandons calls
/// that ignore it after the cancellation grace period.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool_name: &str,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, TaskError>;
}
