use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taskplan_core::api::{Parameters, TaskError, ToolInvoker};
use tokio_util::sync::CancellationToken;

/// A named capability a task can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn call(&self, parameters: &Parameters, cancel: CancellationToken)
        -> Result<Value, TaskError>;
}

/// Tool invoker that dispatches on `tool_name` to registered tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `echo` and `sleep`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::EchoTool));
        registry.register(Arc::new(super::SleepTool));
        registry
    }

    /// Add `tool`, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replaced registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(
        &self,
        tool_name: &str,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<Value, TaskError> {
        let Some(tool) = self.tools.get(tool_name) else {
            return Err(TaskError::unknown_tool(tool_name));
        };
        tool.call(parameters, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taskplan_core::api::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn unknown_tool_is_a_classified_error() {
        let registry = ToolRegistry::with_builtins();
        let err = registry
            .invoke("teleport", &Parameters::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.names(), ["echo", "sleep"]);

        let mut params = Parameters::new();
        params.insert("text".into(), json!("hi"));
        let value = registry
            .invoke("echo", &params, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value["echo"]["text"], "hi");
    }
}
