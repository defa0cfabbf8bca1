//! Tool registry: named capabilities behind a uniform execute contract.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use fathom_domain::error::{Error, Result};

/// A named tool with a JSON-argument contract.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, args: Value) -> Result<String>;
}

/// Registry of tools available to one agent.
///
/// Built once per agent and read-only thereafter; the agent loop turns
/// execution errors into result strings fed back to the model, so a
/// failing tool never aborts the loop.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Registered tool names, sorted for stable prompts.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// One line per tool, for system prompts.
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::tool(name, "unknown tool"))?;

        tracing::debug!(tool = name, "executing tool");
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        async fn execute(&self, args: Value) -> Result<String> {
            Ok(args.to_string())
        }
    }

    #[tokio::test]
    async fn register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));

        assert_eq!(registry.tool_names(), vec!["echo"]);
        let result = registry
            .execute("echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("ghost", Value::Null).await;
        assert!(matches!(err, Err(Error::ToolExecution { .. })));
    }
}
