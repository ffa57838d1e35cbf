//! Provider selection.

use fochs_turn::ProviderId;

use crate::TaskComplexity;

/// Providers tried after the selected one fails, in priority order.
pub const FALLBACK_ORDER: [ProviderId; 3] =
    [ProviderId::Claude, ProviderId::Gemini, ProviderId::Ollama];

/// Pick the provider for a request. First match wins.
///
/// `configured` reports whether a provider is present. Returns `None` when
/// no rule matches a configured provider.
pub fn select_provider(
    complexity: TaskComplexity,
    has_tools: bool,
    preferred: Option<ProviderId>,
    configured: impl Fn(ProviderId) -> bool,
) -> Option<ProviderId> {
    if let Some(id) = preferred.filter(|id| configured(*id)) {
        return Some(id);
    }

    let candidates: &[ProviderId] = if has_tools {
        &[ProviderId::Claude, ProviderId::Gemini]
    } else {
        match complexity {
            TaskComplexity::Trivial | TaskComplexity::Simple => {
                &[ProviderId::Ollama, ProviderId::Claude]
            }
            TaskComplexity::Complex => &[ProviderId::Claude, ProviderId::Gemini],
            TaskComplexity::WebSearch => &[ProviderId::Gemini, ProviderId::Claude],
            TaskComplexity::Social => &[ProviderId::Grok, ProviderId::Claude],
        }
    };

    candidates.iter().copied().find(|id| configured(*id))
}
