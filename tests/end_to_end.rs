//! Cross-crate tests: budget, router, tools, loop and sub-agents wired by
//! hand and through the `fochs` facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use fochs::prelude::*;
use fochs_turn::{StopReason, ToolCall};
use futures::StreamExt;
use serde_json::{Value, json};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fails every call.
struct DownLlm(ProviderId);

#[async_trait]
impl Provider for DownLlm {
    fn id(&self) -> ProviderId {
        self.0
    }

    async fn generate(&self, _request: &ProviderRequest) -> Result<LlmResponse, ProviderError> {
        Err(ProviderError::RequestFailed(format!("{} unreachable", self.0)))
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Calls `web_search` once, then answers with what it found.
struct SearchingLlm {
    id: ProviderId,
    calls: AtomicUsize,
}

impl SearchingLlm {
    fn new(id: ProviderId) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Provider for SearchingLlm {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<LlmResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        let answered = request
            .messages
            .last()
            .is_some_and(|m| m.role == fochs_turn::Role::User && m.text().is_empty());
        if answered || request.tools.is_empty() {
            return Ok(LlmResponse::text(self.id, "rust 1.85 shipped edition 2024", usage));
        }
        Ok(LlmResponse {
            content: "Searching.".into(),
            tool_calls: vec![ToolCall {
                id: "s1".into(),
                name: "web_search".into(),
                input: json!({"query": "latest rust release"}),
            }],
            usage,
            stop_reason: StopReason::ToolUse,
            model: "searching".into(),
            provider: self.id,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct WebSearch;

#[async_trait]
impl Tool for WebSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, input: Value) -> Result<String, ToolError> {
        Ok(format!("results for {}", input["query"]))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn loop_survives_primary_outage_and_settles_budget() {
    let budget = Arc::new(TokenBudget::new(BudgetLimits::default()));
    let gemini = SearchingLlm::new(ProviderId::Gemini);
    let router = Arc::new(
        LlmRouter::new()
            .with_provider(Arc::new(DownLlm(ProviderId::Claude)))
            .with_provider(gemini.clone())
            .with_budget(budget.clone()),
    );
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(WebSearch));

    let events = AgentLoop::new(router, Arc::new(tools))
        .run_to_end("what's new in rust?", Vec::new())
        .await;

    let kinds: Vec<_> = events.iter().map(AgentEvent::kind).collect();
    assert_eq!(kinds, vec!["thinking", "tool_call", "tool_result", "response"]);
    assert_eq!(
        events[2].payload,
        EventPayload::ToolResult {
            tool: "web_search".into(),
            output: "results for \"latest rust release\"".into()
        }
    );
    assert_eq!(gemini.calls.load(Ordering::SeqCst), 2);
    // Two successful calls of 150 tokens each; failed attempts cost nothing.
    assert_eq!(budget.status().daily_usage, 300);
}

#[tokio::test]
async fn events_serialize_for_front_ends() {
    let agent = Agent::builder(FochsConfig::default())
        .provider(SearchingLlm::new(ProviderId::Claude))
        .tool(Arc::new(WebSearch))
        .build();

    let events: Vec<AgentEvent> = agent.process("dana", "rust news").collect().await;
    let lines: Vec<Value> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();

    assert_eq!(lines[0]["type"], "thinking");
    assert_eq!(lines[1]["type"], "tool_call");
    assert_eq!(lines[1]["input"]["query"], "latest rust release");
    assert_eq!(lines.last().unwrap()["type"], "response");
    assert!(lines.iter().all(|l| l["timestamp"].is_string()));
}

#[tokio::test]
async fn concurrent_users_share_one_budget() {
    let agent = Arc::new(
        Agent::builder(FochsConfig::default())
            .provider(SearchingLlm::new(ProviderId::Claude))
            .without_delegation()
            .build(),
    );

    let runs = ["u1", "u2", "u3", "u4"].map(|user| {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            let events: Vec<AgentEvent> = agent.process(user, "hi").collect().await;
            events
        })
    });
    for run in runs {
        let events = run.await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::Response { .. }));
    }

    let status = agent.status().await;
    assert_eq!(status.budget.unwrap().daily_usage, 4 * 150);
}

#[tokio::test]
async fn kill_switch_stops_every_entry_point() {
    let budget = Arc::new(TokenBudget::new(BudgetLimits::default()));
    let llm = SearchingLlm::new(ProviderId::Claude);
    let agent = Agent::builder(FochsConfig::default())
        .provider(llm.clone())
        .tool(Arc::new(WebSearch))
        .budget(budget.clone())
        .build();

    budget.kill();
    let events: Vec<AgentEvent> = agent.process("erin", "hi").collect().await;
    assert!(matches!(
        &events[0].payload,
        EventPayload::Error { recoverable: false, message } if message.contains("kill switch")
    ));

    let sub = agent
        .subagents()
        .unwrap()
        .run_default("research", "anything")
        .await;
    assert!(sub.starts_with("[error] "), "{sub}");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);

    budget.resume();
    let events: Vec<AgentEvent> = agent.process("erin", "hi").collect().await;
    assert!(events.last().unwrap().is_terminal());
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Response { .. }
    ));
}
