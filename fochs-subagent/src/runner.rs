//! Concurrency- and time-bounded execution of sub-agents.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fochs_loop::{AgentLoop, EventPayload};
use fochs_router::LlmRouter;
use fochs_tool::ToolRegistry;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::SubAgentError;
use crate::config::{SubAgentConfig, builtin_configs};

/// Sub-agents allowed to run at once.
pub const MAX_CONCURRENT: usize = 3;

/// Time limit used by [`SubAgentRunner::run_default`] and the delegate tool.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Snapshot of a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAgentStatus {
    /// Sub-agents currently holding a slot.
    pub active: usize,
    /// Slot count.
    pub max_concurrent: usize,
    /// Type names that can be requested.
    pub available_types: Vec<String>,
}

/// Runs nested agent loops for delegated tasks.
///
/// At most [`MAX_CONCURRENT`] run at once; further requests wait for a
/// slot, and the wait counts against their time limit. Meant to exist once
/// per process.
pub struct SubAgentRunner {
    router: Arc<LlmRouter>,
    tools: Arc<ToolRegistry>,
    configs: BTreeMap<String, SubAgentConfig>,
    slots: Semaphore,
    active: AtomicUsize,
    default_timeout: Duration,
}

impl std::fmt::Debug for SubAgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgentRunner")
            .field("types", &self.configs.keys().collect::<Vec<_>>())
            .field("active", &self.active())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Holds the active count up for as long as it lives.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SubAgentRunner {
    /// A runner over the built-in catalog. `tools` is the parent registry
    /// each sub-agent's tools are drawn from.
    pub fn new(router: Arc<LlmRouter>, tools: Arc<ToolRegistry>) -> Self {
        Self::with_configs(router, tools, builtin_configs().into_values())
    }

    /// A runner over a custom catalog.
    pub fn with_configs(
        router: Arc<LlmRouter>,
        tools: Arc<ToolRegistry>,
        configs: impl IntoIterator<Item = SubAgentConfig>,
    ) -> Self {
        Self {
            router,
            tools,
            configs: configs
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            slots: Semaphore::new(MAX_CONCURRENT),
            active: AtomicUsize::new(0),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Change the time limit used when none is given.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The time limit used when none is given.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Sub-agents currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Requestable type names, sorted.
    pub fn available_types(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// The config for a type name.
    pub fn config(&self, agent_type: &str) -> Option<&SubAgentConfig> {
        self.configs.get(agent_type)
    }

    /// Current counters and catalog.
    pub fn status(&self) -> SubAgentStatus {
        SubAgentStatus {
            active: self.active(),
            max_concurrent: MAX_CONCURRENT,
            available_types: self.available_types(),
        }
    }

    /// Run `task` on a sub-agent with the default time limit.
    pub async fn run_default(&self, agent_type: &str, task: &str) -> String {
        self.run(agent_type, task, self.default_timeout).await
    }

    /// Run `task` on a sub-agent of `agent_type` and return its text.
    ///
    /// Never fails: unknown types, timeouts and panics come back as text.
    /// The result joins every response and every `[error] `-prefixed error
    /// the nested run produced.
    pub async fn run(&self, agent_type: &str, task: &str, timeout: Duration) -> String {
        let Some(config) = self.configs.get(agent_type) else {
            tracing::warn!(agent_type, "unknown sub-agent type");
            return SubAgentError::UnknownType {
                requested: agent_type.to_string(),
                available: self.available_types().join(", "),
            }
            .to_string();
        };

        let tools = self.tools.subset(&config.allowed_tools);
        tracing::info!(
            agent_type,
            tools = ?tools.tool_names(),
            max_iterations = config.max_iterations,
            "sub-agent starting"
        );

        let work = AssertUnwindSafe(self.execute(config, tools, task)).catch_unwind();
        match tokio::time::timeout(timeout, work).await {
            Ok(Ok(result)) => result.unwrap_or_else(|e| e.to_string()),
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(agent_type, error = %message, "sub-agent panicked");
                SubAgentError::Failure {
                    agent_type: agent_type.to_string(),
                    message,
                }
                .to_string()
            }
            Err(_) => {
                tracing::warn!(agent_type, ?timeout, "sub-agent timed out");
                SubAgentError::Timeout {
                    agent_type: agent_type.to_string(),
                    limit: timeout,
                }
                .to_string()
            }
        }
    }

    async fn execute(
        &self,
        config: &SubAgentConfig,
        tools: ToolRegistry,
        task: &str,
    ) -> Result<String, SubAgentError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|e| SubAgentError::Failure {
                agent_type: config.name.clone(),
                message: e.to_string(),
            })?;
        let _active = ActiveGuard::enter(&self.active);

        let agent = AgentLoop::new(Arc::clone(&self.router), Arc::new(tools))
            .with_system_prompt(config.system_prompt.clone())
            .with_max_iterations(config.max_iterations)
            .with_run_token_limit(config.max_tokens);

        let mut parts = Vec::new();
        let mut events = std::pin::pin!(agent.run(task, Vec::new()));
        while let Some(event) = events.next().await {
            match event.payload {
                EventPayload::Response { content } => parts.push(content),
                EventPayload::Error { message, .. } => parts.push(format!("[error] {message}")),
                _ => {}
            }
        }

        let result = if parts.is_empty() {
            format!("sub-agent '{}' returned no response", config.name)
        } else {
            parts.join("\n")
        };
        tracing::info!(
            agent_type = %config.name,
            result_length = result.len(),
            "sub-agent completed"
        );
        Ok(result)
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
