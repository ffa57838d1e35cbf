//! The `delegate` tool.

use std::sync::Arc;

use async_trait::async_trait;
use fochs_tool::{Tool, ToolDefinition, ToolError};
use serde_json::{Value, json};

use crate::SubAgentRunner;

/// Lets the model hand a task to a sub-agent.
#[derive(Debug, Clone)]
pub struct DelegateTool {
    runner: Arc<SubAgentRunner>,
}

impl DelegateTool {
    /// Forward calls to `runner`.
    pub fn new(runner: Arc<SubAgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn definition(&self) -> ToolDefinition {
        let types = self.runner.available_types();
        let described = types
            .iter()
            .filter_map(|name| self.runner.config(name))
            .map(|config| {
                format!(
                    "'{}' ({} tools, {} steps)",
                    config.name,
                    config.allowed_tools.len(),
                    config.max_iterations
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        ToolDefinition {
            name: "delegate".into(),
            description: format!(
                "Delegate a complex task to a specialized sub-agent that works \
                 autonomously and returns its result. Available types: {described}."
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_type": {
                        "type": "string",
                        "enum": types,
                        "description": "Type of sub-agent to use."
                    },
                    "task": {
                        "type": "string",
                        "description": "Detailed task description. Be specific about what you need."
                    }
                },
                "required": ["agent_type", "task"]
            }),
        }
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        let agent_type = input
            .get("agent_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("agent_type must be a string".into()))?;
        let task = input
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("task must be a string".into()))?;

        tracing::info!(agent_type, task_length = task.len(), "delegating");
        Ok(self.runner.run_default(agent_type, task).await)
    }
}
