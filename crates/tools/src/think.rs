//! The `think` tool: a no-op whose only effect is putting reasoning
//! into the transcript so later turns can condition on it. Think calls
//! are filtered out during context compression.

use serde::Deserialize;
use serde_json::Value;

use fathom_domain::error::{Error, Result};

use crate::registry::Tool;

#[derive(Deserialize)]
struct ThinkArgs {
    #[serde(default)]
    reflection: String,
}

pub struct ThinkTool;

#[async_trait::async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Record a reflection to reason over in later turns. Args: {\"reflection\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: ThinkArgs =
            serde_json::from_value(args).map_err(|e| Error::tool("think", e.to_string()))?;
        let prefix: String = args.reflection.chars().take(100).collect();
        Ok(format!("Reflection recorded: {prefix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_first_100_chars() {
        let long = "x".repeat(250);
        let out = ThinkTool
            .execute(serde_json::json!({"reflection": long}))
            .await
            .unwrap();
        assert_eq!(out, format!("Reflection recorded: {}", "x".repeat(100)));
    }

    #[tokio::test]
    async fn empty_reflection_is_fine() {
        let out = ThinkTool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(out, "Reflection recorded: ");
    }
}
