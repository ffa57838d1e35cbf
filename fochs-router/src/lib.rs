#![deny(missing_docs)]
//! Multi-provider LLM router for fochs.
//!
//! [`LlmRouter`] picks a provider per request from the task's
//! [`TaskComplexity`], reserves the request's `max_tokens` against a shared
//! [`TokenBudget`], and falls back through the remaining providers when the
//! selected one fails. A reservation is settled to the actual usage on
//! success and released when every provider fails.

mod select;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fochs_budget::{BudgetError, Reservation, TokenBudget};
use fochs_turn::{
    LlmResponse, Message, Provider, ProviderError, ProviderId, ProviderRequest, ToolDefinition,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use select::{FALLBACK_ORDER, select_provider};

/// Default bound on one provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// How demanding a task is. Only biases provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    /// Greetings, acknowledgements.
    Trivial,
    /// Short factual answers.
    Simple,
    /// Reasoning or multi-step work.
    #[default]
    Complex,
    /// Needs fresh web results.
    WebSearch,
    /// Social-media tone or content.
    Social,
}

/// A routed completion request.
#[derive(Debug, Clone)]
pub struct RouterRequest {
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
    /// System prompt.
    pub system: Option<String>,
    /// Output ceiling. Also the amount reserved against the budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Task complexity hint.
    pub complexity: TaskComplexity,
    /// Provider to use when configured, bypassing the complexity rules.
    pub preferred: Option<ProviderId>,
}

impl RouterRequest {
    /// A request with default settings.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            system: None,
            max_tokens: 4096,
            temperature: 0.7,
            complexity: TaskComplexity::Complex,
            preferred: None,
        }
    }

    /// Set the advertised tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the output ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the complexity hint.
    pub fn with_complexity(mut self, complexity: TaskComplexity) -> Self {
        self.complexity = complexity;
        self
    }

    /// Prefer a specific provider.
    pub fn with_preferred(mut self, provider: ProviderId) -> Self {
        self.preferred = Some(provider);
        self
    }

    fn for_provider(&self, provider: &dyn Provider) -> ProviderRequest {
        ProviderRequest {
            messages: self.messages.clone(),
            tools: if provider.supports_tools() {
                self.tools.clone()
            } else {
                Vec::new()
            },
            system: self.system.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Errors from [`LlmRouter::generate`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RouterError {
    /// The budget refused the reservation. Nothing was called.
    #[error("token budget exceeded: {0}")]
    BudgetExceeded(#[from] BudgetError),

    /// No configured provider matches the request.
    #[error("no LLM provider available")]
    NoProviderAvailable,

    /// Every candidate provider failed. Carries the last failure.
    #[error("all LLM providers failed (last error: {0})")]
    AllProvidersFailed(ProviderError),
}

impl RouterError {
    /// Whether trying again later can succeed without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RouterError::AllProvidersFailed(_))
    }
}

/// Routes completion requests across the configured providers.
pub struct LlmRouter {
    providers: BTreeMap<ProviderId, Arc<dyn Provider>>,
    budget: Option<Arc<TokenBudget>>,
    call_timeout: Duration,
}

impl std::fmt::Debug for LlmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRouter")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("budget", &self.budget.is_some())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Default for LlmRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmRouter {
    /// A router with no providers and no budget.
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            budget: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Configure a provider under its own [`Provider::id`], replacing any
    /// earlier one with the same identity.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.id(), provider);
        self
    }

    /// Share a token budget.
    pub fn with_budget(mut self, budget: Arc<TokenBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Bound every provider call. A timed-out call counts as a failure.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The shared budget, if any.
    pub fn budget(&self) -> Option<&Arc<TokenBudget>> {
        self.budget.as_ref()
    }

    /// Configured provider identities.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }

    /// Generate a completion, falling back across providers on failure.
    pub async fn generate(&self, request: RouterRequest) -> Result<LlmResponse, RouterError> {
        let primary = select_provider(
            request.complexity,
            !request.tools.is_empty(),
            request.preferred,
            |id| self.providers.contains_key(&id),
        )
        .ok_or(RouterError::NoProviderAvailable)?;

        let reservation = match &self.budget {
            Some(budget) => match budget.reserve(u64::from(request.max_tokens)) {
                Ok(reservation) => Some(reservation),
                Err(e) => {
                    tracing::warn!(error = %e, "request refused by token budget");
                    return Err(e.into());
                }
            },
            None => None,
        };

        let mut last_error = match self.call(primary, &request).await {
            Ok(response) => return Ok(self.finish(response, reservation, &request)),
            Err(e) => {
                tracing::warn!(provider = %primary, error = %e, "provider failed");
                e
            }
        };

        for fallback in FALLBACK_ORDER {
            if fallback == primary || !self.providers.contains_key(&fallback) {
                continue;
            }
            tracing::warn!(from = %primary, to = %fallback, "falling back");
            match self.call(fallback, &request).await {
                Ok(response) => return Ok(self.finish(response, reservation, &request)),
                Err(e) => {
                    tracing::warn!(provider = %fallback, error = %e, "fallback provider failed");
                    last_error = e;
                }
            }
        }

        if let Some(reservation) = reservation {
            reservation.release();
        }
        Err(RouterError::AllProvidersFailed(last_error))
    }

    async fn call(
        &self,
        id: ProviderId,
        request: &RouterRequest,
    ) -> Result<LlmResponse, ProviderError> {
        let Some(provider) = self.providers.get(&id) else {
            return Err(ProviderError::RequestFailed(format!("{id} is not configured")));
        };
        let provider_request = request.for_provider(provider.as_ref());
        match tokio::time::timeout(self.call_timeout, provider.generate(&provider_request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout.as_secs_f64())),
        }
    }

    fn finish(
        &self,
        response: LlmResponse,
        reservation: Option<Reservation<'_>>,
        request: &RouterRequest,
    ) -> LlmResponse {
        let tokens = response.usage.total();
        if let Some(reservation) = reservation {
            reservation.settle(tokens);
        }
        tracing::info!(
            provider = %response.provider,
            model = %response.model,
            complexity = ?request.complexity,
            tokens,
            tool_calls = response.tool_calls.len(),
            "llm response"
        );
        response
    }

    /// Probe every provider identity. Unconfigured or unreachable
    /// providers report `false`; a probe that outlives the call timeout
    /// counts as unreachable.
    pub async fn check_availability(&self) -> BTreeMap<ProviderId, bool> {
        let mut availability = BTreeMap::new();
        for id in ProviderId::ALL {
            let available = match self.providers.get(&id) {
                Some(provider) => {
                    tokio::time::timeout(self.call_timeout, provider.is_available())
                        .await
                        .unwrap_or(false)
                }
                None => false,
            };
            availability.insert(id, available);
        }
        availability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = RouterRequest::new(vec![Message::user("hi")]);
        assert_eq!(req.max_tokens, 4096);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.complexity, TaskComplexity::Complex);
        assert!(req.preferred.is_none());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn recoverability() {
        assert!(RouterError::AllProvidersFailed(ProviderError::RateLimited).is_recoverable());
        assert!(!RouterError::NoProviderAvailable.is_recoverable());
        assert!(!RouterError::BudgetExceeded(BudgetError::KillSwitch).is_recoverable());
    }

    #[test]
    fn complexity_serde() {
        let json = serde_json::to_string(&TaskComplexity::WebSearch).unwrap();
        assert_eq!(json, "\"web_search\"");
        assert_eq!(TaskComplexity::default(), TaskComplexity::Complex);
    }
}
