//! Tool trait and registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use dispatch_agent_core::FunctionSchema;

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool {0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool execution failed: {0}")]
    Execution(String),
}

/// A callable dispatch function
#[async_trait]
pub trait DispatchTool: Send + Sync + 'static {
    /// Function name advertised to providers
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the argument object
    fn parameters(&self) -> serde_json::Value;

    /// Execute with an already-validated JSON object of arguments
    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Registry of dispatch tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn DispatchTool>>,
    execution_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(execution_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            execution_timeout,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn DispatchTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for the named tools, preserving the requested order
    ///
    /// Unknown names are skipped; an agent config may reference tools that
    /// are disabled in this deployment.
    pub fn schemas_for(&self, names: &[String]) -> Vec<FunctionSchema> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| FunctionSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Schemas for every registered tool
    pub fn all_schemas(&self) -> Vec<FunctionSchema> {
        let mut schemas: Vec<FunctionSchema> = self
            .tools
            .values()
            .map(|tool| FunctionSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a tool under the registry's bounded timeout
    pub async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        match tokio::time::timeout(self.execution_timeout, tool.execute(arguments)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = name, timeout = ?self.execution_timeout, "Tool timed out");
                Err(ToolError::Timeout(name.to_string(), self.execution_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowTool;

    #[async_trait]
    impl DispatchTool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "never finishes in time"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn execute(
            &self,
            _arguments: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::json!({}))
        }
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new(Duration::from_millis(100));
        let err = registry
            .execute("missing", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let mut registry = ToolRegistry::new(Duration::from_millis(20));
        registry.register(Arc::new(SlowTool));
        let err = registry
            .execute("slow", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_, _)));
    }

    #[tokio::test]
    async fn test_schemas_for_skips_unknown_names() {
        let mut registry = ToolRegistry::new(Duration::from_millis(100));
        registry.register(Arc::new(SlowTool));
        let schemas = registry.schemas_for(&[
            "slow".to_string(),
            "not_registered".to_string(),
        ]);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "slow");
    }
}
