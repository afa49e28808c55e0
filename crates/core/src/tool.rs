//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: evaluate arithmetic,
//! look up the weather, query the knowledge base, etc. They are registered
//! once at startup; the registry is then shared immutably behind an `Arc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::schema;

/// Default per-call execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool considers the call successful
    pub success: bool,

    /// The output content shown to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful plain-text result.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A result the tool itself reports as unsuccessful (e.g. "not found").
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
///
/// Each built-in (calculator, weather_lookup, knowledge_base_query, ...)
/// implements this trait and is dispatched by name through [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// JSON Schema for the structured `data` of a result, if declared.
    fn output_schema(&self) -> Option<serde_json::Value> {
        None
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Validate and execute tools when the model requests them
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Set the per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a tool. Names are unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateToolName(name));
        }
        debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Validate arguments, then execute the named tool under the timeout.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        schema::validate(&tool.parameters_schema(), &arguments).map_err(|reason| {
            ToolError::SchemaValidation {
                tool_name: name.to_string(),
                reason,
            }
        })?;

        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, tool.execute(arguments)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e @ ToolError::ExecutionFailed { .. })) => return Err(e),
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    cause: e.to_string(),
                });
            }
            Err(_) => {
                warn!(tool = %name, timeout_ms = self.timeout.as_millis() as u64, "Tool timed out");
                return Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if let (Some(out_schema), Some(data)) = (tool.output_schema(), result.data.as_ref()) {
            schema::validate(&out_schema, data).map_err(|reason| ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                cause: format!("output does not match declared schema: {reason}"),
            })?;
        }

        debug!(
            tool = %name,
            success = result.success,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        Ok(result)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok(text))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Sleeps for a minute" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::ok("done"))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str { "failing" }
        fn description(&self) -> &str { "Always fails" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            Err(ToolError::InvalidArguments("division by zero".into()))
        }
    }

    struct BadOutputTool;

    #[async_trait]
    impl Tool for BadOutputTool {
        fn name(&self) -> &str { "bad_output" }
        fn description(&self) -> &str { "Returns data violating its output schema" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn output_schema(&self) -> Option<serde_json::Value> {
            Some(serde_json::json!({
                "type": "object",
                "properties": { "value": { "type": "number" } },
                "required": ["value"]
            }))
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("x").with_data(serde_json::json!({ "value": "nope" })))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.timeout(), DEFAULT_TOOL_TIMEOUT);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert_eq!(err, ToolError::DuplicateToolName("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool)).unwrap();
        registry.register(Box::new(EchoTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(registry.names(), vec!["echo", "slow"]);
    }

    #[tokio::test]
    async fn invoke_valid_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let result = registry
            .invoke("echo", serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nonexistent", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("nonexistent".into()));
    }

    #[tokio::test]
    async fn invoke_rejects_invalid_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.invoke("echo", serde_json::json!({"text": 5})).await.unwrap_err();
        assert!(matches!(err, ToolError::SchemaValidation { ref tool_name, .. } if tool_name == "echo"));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(100));
        registry.register(Box::new(SlowTool)).unwrap();
        let err = registry.invoke("slow", serde_json::json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Timeout {
                tool_name: "slow".into(),
                timeout_ms: 100
            }
        );
    }

    #[tokio::test]
    async fn tool_errors_become_execution_failed() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool)).unwrap();
        let err = registry.invoke("failing", serde_json::json!({})).await.unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, cause } => {
                assert_eq!(tool_name, "failing");
                assert!(cause.contains("division by zero"));
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_schema_is_enforced() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(BadOutputTool)).unwrap();
        let err = registry.invoke("bad_output", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
