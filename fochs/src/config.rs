//! Runtime configuration, loaded from `FOCHS_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fochs_budget::BudgetLimits;
use thiserror::Error;

/// Configuration errors.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("invalid value for {key}: '{value}'")]
    Invalid {
        /// Variable name.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Settings for an [`Agent`](crate::Agent).
#[derive(Debug, Clone, PartialEq)]
pub struct FochsConfig {
    /// Bound on model calls per message.
    pub max_iterations: u32,
    /// Token ceilings.
    pub budget: BudgetLimits,
    /// Where budget counters are persisted, if anywhere.
    pub budget_state_path: Option<PathBuf>,
    /// Time limit for a delegated sub-agent run.
    pub subagent_timeout: Duration,
    /// Time limit for one provider call.
    pub llm_timeout: Duration,
    /// Messages kept per user by the in-memory history.
    pub history_window: usize,
}

impl Default for FochsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            budget: BudgetLimits::default(),
            budget_state_path: None,
            subagent_timeout: Duration::from_secs(120),
            llm_timeout: Duration::from_secs(120),
            history_window: 50,
        }
    }
}

impl FochsConfig {
    /// Load from the process environment.
    ///
    /// Environment variables (all optional):
    /// - `FOCHS_MAX_ITERATIONS`: model calls per message (default: 10)
    /// - `FOCHS_DAILY_TOKEN_LIMIT`: daily ceiling (default: 500000)
    /// - `FOCHS_MONTHLY_TOKEN_LIMIT`: monthly ceiling (default: 10000000)
    /// - `FOCHS_RUN_TOKEN_LIMIT`: per-run ceiling (default: 50000)
    /// - `FOCHS_BUDGET_STATE_PATH`: JSON file for budget counters
    /// - `FOCHS_SUBAGENT_TIMEOUT_SECS`: sub-agent time limit (default: 120)
    /// - `FOCHS_LLM_TIMEOUT_SECS`: provider call time limit (default: 120)
    /// - `FOCHS_HISTORY_WINDOW`: messages kept per user (default: 50)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_iterations = positive(&lookup, "FOCHS_MAX_ITERATIONS", defaults.max_iterations)?;
        let budget = BudgetLimits {
            daily: positive(&lookup, "FOCHS_DAILY_TOKEN_LIMIT", defaults.budget.daily)?,
            monthly: positive(&lookup, "FOCHS_MONTHLY_TOKEN_LIMIT", defaults.budget.monthly)?,
            per_run: positive(&lookup, "FOCHS_RUN_TOKEN_LIMIT", defaults.budget.per_run)?,
        };
        let budget_state_path = lookup("FOCHS_BUDGET_STATE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let subagent_timeout = Duration::from_secs(positive(
            &lookup,
            "FOCHS_SUBAGENT_TIMEOUT_SECS",
            defaults.subagent_timeout.as_secs(),
        )?);
        let llm_timeout = Duration::from_secs(positive(
            &lookup,
            "FOCHS_LLM_TIMEOUT_SECS",
            defaults.llm_timeout.as_secs(),
        )?);
        let history_window = positive(&lookup, "FOCHS_HISTORY_WINDOW", defaults.history_window)?;

        Ok(Self {
            max_iterations,
            budget,
            budget_state_path,
            subagent_timeout,
            llm_timeout,
            history_window,
        })
    }
}

/// Parse a positive number, falling back to `default` when unset.
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}
