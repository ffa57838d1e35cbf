//! Provider trait for LLM backends.
//!
//! The provider set is closed: [`ProviderId`] names every backend the
//! router knows how to route to. Concrete HTTP clients live outside this
//! workspace and implement [`Provider`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{LlmResponse, ProviderRequest};

/// Identity of an LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Primary cloud provider with the strongest tool use.
    Claude,
    /// Search-grounded provider, secondary cloud fallback.
    Gemini,
    /// Cheap local provider.
    Ollama,
    /// Specialized social-media provider.
    Grok,
}

impl ProviderId {
    /// Every provider identity, in declaration order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Claude,
        ProviderId::Gemini,
        ProviderId::Ollama,
        ProviderId::Grok,
    ];

    /// Lowercase name used in config and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::Gemini => "gemini",
            ProviderId::Ollama => "ollama",
            ProviderId::Grok => "grok",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider name that matches no [`ProviderId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(
    /// The name as given.
    pub String,
);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within the router's deadline.
    #[error("timed out after {0:.1}s")]
    Timeout(f64),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_) | ProviderError::Timeout(_)
        )
    }
}

/// LLM provider interface.
///
/// Object-safe so the router can hold a heterogeneous map of
/// `Arc<dyn Provider>`. Implementations must not block indefinitely; the
/// router still bounds every call with its own timeout.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this is.
    fn id(&self) -> ProviderId;

    /// Whether tool definitions should be forwarded to this provider.
    fn supports_tools(&self) -> bool {
        false
    }

    /// Send a completion request to the provider.
    async fn generate(&self, request: &ProviderRequest) -> Result<LlmResponse, ProviderError>;

    /// Cheap reachability probe. Never errors; unreachable means `false`.
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display() {
        assert_eq!(
            ProviderError::RequestFailed("timeout".into()).to_string(),
            "request failed: timeout"
        );
        assert_eq!(ProviderError::RateLimited.to_string(), "rate limited");
        assert_eq!(ProviderError::Timeout(120.0).to_string(), "timed out after 120.0s");
    }

    #[test]
    fn provider_error_retryable() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::Timeout(1.0).is_retryable());
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("x".into()).is_retryable());
    }

    #[test]
    fn provider_id_parses_case_insensitively() {
        assert_eq!("Claude".parse::<ProviderId>().unwrap(), ProviderId::Claude);
        assert_eq!(" ollama ".parse::<ProviderId>().unwrap(), ProviderId::Ollama);
        let err = "openai".parse::<ProviderId>().unwrap_err();
        assert_eq!(err, UnknownProvider("openai".into()));
        assert_eq!(err.to_string(), "unknown provider: openai");
    }

    #[test]
    fn provider_id_display_matches_serde() {
        for id in ProviderId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{id}\""));
        }
    }
}
