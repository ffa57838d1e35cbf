#![deny(missing_docs)]
//! Tool interface and registry for fochs.
//!
//! A [`Tool`] is an async capability the model can invoke by name. The
//! [`ToolRegistry`] validates every call against the tool's declared
//! schema, turns failures (including panics) into text the model can read,
//! and bounds the size of what flows back into the context window.

mod registry;
mod validate;

use async_trait::async_trait;
use thiserror::Error;

pub use fochs_turn::ToolDefinition;
pub use registry::{MAX_OUTPUT_CHARS, ToolRegistry, truncate_output};
pub use validate::validate_input;

/// Errors from tool lookup, validation and execution.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// No tool is registered under this name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// The input does not match the tool's schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tool ran and reported a failure.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool panicked while running.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// An invocable capability.
///
/// Implementations should report expected failures as
/// `Err(ToolError::ExecutionFailed(..))` or as descriptive text; the
/// registry tolerates errors and panics either way.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and input schema.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool on already-validated input.
    async fn call(&self, input: serde_json::Value) -> Result<String, ToolError>;
}
