#![deny(missing_docs)]
//! # fochs: umbrella crate
//!
//! A token-budgeted agent core: a multi-provider LLM router, a validated
//! tool registry, a bounded tool-calling loop streamed as events, and
//! sub-agent delegation. This crate re-exports the component crates and
//! wires them into an [`Agent`] from a [`FochsConfig`].

mod agent;
mod config;
mod history;

pub use fochs_budget;
pub use fochs_loop;
pub use fochs_router;
pub use fochs_subagent;
pub use fochs_tool;
pub use fochs_turn;

pub use agent::{Agent, AgentBuilder, AgentStatus, DEFAULT_SYSTEM_PROMPT};
pub use config::{ConfigError, FochsConfig};
pub use history::{HistoryError, HistoryStore, MemoryHistory};

/// Happy-path imports for assembling an agent.
pub mod prelude {
    pub use crate::{Agent, FochsConfig, HistoryStore, MemoryHistory};

    pub use fochs_budget::{BudgetLimits, TokenBudget};
    pub use fochs_loop::{AgentEvent, AgentLoop, EventPayload};
    pub use fochs_router::{LlmRouter, RouterError, TaskComplexity};
    pub use fochs_subagent::{DelegateTool, SubAgentRunner};
    pub use fochs_tool::{Tool, ToolError, ToolRegistry};
    pub use fochs_turn::{
        LlmResponse, Message, Provider, ProviderError, ProviderId, ProviderRequest, TokenUsage,
        ToolDefinition,
    };
}
