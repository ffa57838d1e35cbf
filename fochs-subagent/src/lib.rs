#![deny(missing_docs)]
//! Sub-agent delegation for fochs.
//!
//! A [`SubAgentRunner`] runs a narrower copy of the agent loop for one
//! task: restricted tools, its own iteration and token bounds, a time
//! limit, and a process-wide cap on concurrent runs. The
//! [`DelegateTool`] exposes it to the model.

mod config;
mod delegate;
mod runner;

use std::time::Duration;

use thiserror::Error;

pub use config::{SubAgentConfig, builtin_configs};
pub use delegate::DelegateTool;
pub use runner::{DEFAULT_TIMEOUT, MAX_CONCURRENT, SubAgentRunner, SubAgentStatus};

/// Failures of a sub-agent run. The runner renders them as text.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubAgentError {
    /// No sub-agent type has this name.
    #[error("unknown sub-agent type '{requested}'. Available: {available}")]
    UnknownType {
        /// Requested name.
        requested: String,
        /// Sorted, comma-separated valid names.
        available: String,
    },

    /// The run, including the wait for a slot, outlived its limit.
    #[error("sub-agent '{agent_type}' exceeded its time limit ({limit:?})")]
    Timeout {
        /// Sub-agent type.
        agent_type: String,
        /// The limit that expired.
        limit: Duration,
    },

    /// The run failed outright, for example by panicking.
    #[error("sub-agent '{agent_type}' failed: {message}")]
    Failure {
        /// Sub-agent type.
        agent_type: String,
        /// What went wrong.
        message: String,
    },
}
