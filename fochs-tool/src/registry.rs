//! Name-keyed catalog of tools.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::validate::validate_input;
use crate::{Tool, ToolDefinition, ToolError};

/// Results longer than this many characters are truncated.
pub const MAX_OUTPUT_CHARS: usize = 50_000;

#[derive(Clone)]
struct Entry {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
    core: bool,
}

/// Registry of tools, keyed by name, in registration order.
///
/// Entries are shared `Arc`s, so cloning a registry or taking a
/// [`subset`](Self::subset) never copies a tool.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a replaceable tool.
    ///
    /// Returns `false` (and keeps the existing entry) when a core tool
    /// already owns the name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        self.insert(tool, false)
    }

    /// Register a built-in tool that later registrations cannot shadow.
    pub fn register_core(&mut self, tool: Arc<dyn Tool>) -> bool {
        self.insert(tool, true)
    }

    fn insert(&mut self, tool: Arc<dyn Tool>, core: bool) -> bool {
        let definition = tool.definition();
        let entry = Entry {
            definition,
            tool,
            core,
        };
        match self.position(&entry.definition.name) {
            Some(idx) if self.entries[idx].core => {
                tracing::warn!(
                    tool = %entry.definition.name,
                    "registration ignored, name belongs to a core tool"
                );
                false
            }
            Some(idx) => {
                tracing::debug!(tool = %entry.definition.name, core, "tool replaced");
                self.entries[idx] = entry;
                true
            }
            None => {
                tracing::debug!(tool = %entry.definition.name, core, "tool registered");
                self.entries.push(entry);
                true
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.definition.name == name)
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.position(name).map(|idx| Arc::clone(&self.entries[idx].tool))
    }

    /// Whether `name` is registered as a core tool.
    pub fn is_core(&self, name: &str) -> bool {
        self.position(name).is_some_and(|idx| self.entries[idx].core)
    }

    /// Registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.definition.name.clone())
            .collect()
    }

    /// Provider-facing definitions for every tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new registry holding only the named tools.
    ///
    /// Tools are shared, not copied. Unknown names are skipped; core flags
    /// carry over.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let entries = names
            .iter()
            .filter_map(|name| self.position(name.as_ref()))
            .map(|idx| self.entries[idx].clone())
            .collect();
        ToolRegistry { entries }
    }

    /// Validate and run a tool, keeping the error class.
    pub async fn try_execute(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let idx = self
            .position(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let entry = &self.entries[idx];
        validate_input(&input, &entry.definition.input_schema)?;

        match AssertUnwindSafe(entry.tool.call(input)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ToolError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Validate and run a tool, rendering every failure as text.
    ///
    /// Never fails: unknown tools, invalid input, tool errors and panics
    /// all come back as an `Error...` string the model can react to. The
    /// result is bounded by [`MAX_OUTPUT_CHARS`].
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> String {
        let start = Instant::now();
        let output = match self.try_execute(name, input).await {
            Ok(output) => {
                tracing::info!(
                    tool = name,
                    result_length = output.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool executed"
                );
                output
            }
            Err(e @ ToolError::UnknownTool(_)) => {
                tracing::warn!(tool = name, "unknown tool requested");
                format!("Error: {e}")
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool error");
                format!("Error in tool '{name}': {e}")
            }
        };
        truncate_output(output, MAX_OUTPUT_CHARS)
    }
}

/// Cut `output` to `max_chars` characters, appending a visible marker.
pub fn truncate_output(output: String, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        None => output,
        Some((cut, _)) => {
            let total = output.chars().count();
            format!("{}\n... [truncated, {total} chars total]", &output[..cut])
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_output("abc".into(), 3), "abc");
    }

    #[test]
    fn long_output_gets_marker() {
        let out = truncate_output("abcdef".into(), 4);
        assert_eq!(out, "abcd\n... [truncated, 6 chars total]");
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let out = truncate_output("äöüß".into(), 2);
        assert!(out.starts_with("äö\n"));
        assert!(out.contains("4 chars total"));
    }
}
