//! Shared test helpers: scripted providers and failing sources.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use voltwise_core::error::{KnowledgeError, ProviderError};
use voltwise_core::{
    Classification, ConversationMessage, KnowledgeRetriever, Message, MessageToolCall, Passage,
    Provider, ProviderRequest, ProviderResponse, QueryType, Role, SystemSnapshot, Usage,
};

use crate::budget::BudgetPlanner;
use crate::context::{CategoryTokens, ContextBundle};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        assert!(
            index < responses.len(),
            "SequentialMockProvider: no more responses (call #{index}, have {})",
            responses.len()
        );
        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// Returns scripted responses, then fails every further call.
pub struct FailingProvider {
    inner: SequentialMockProvider,
    error: ProviderError,
}

impl FailingProvider {
    pub fn after(responses: Vec<ProviderResponse>, error: ProviderError) -> Self {
        Self {
            inner: SequentialMockProvider::new(responses),
            error,
        }
    }

    pub fn always(error: ProviderError) -> Self {
        Self::after(Vec::new(), error)
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let remaining = self.inner.responses.lock().unwrap().len() > self.inner.call_count();
        if remaining {
            self.inner.complete(request).await
        } else {
            Err(self.error.clone())
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(
    tool_calls: Vec<MessageToolCall>,
    thought: &str,
) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

pub fn snapshot(soc_pct: f32) -> SystemSnapshot {
    SystemSnapshot {
        captured_at: Utc::now(),
        battery_soc_pct: soc_pct,
        battery_power_w: 1200.0,
        battery_temp_c: Some(23.0),
        battery_capacity_kwh: Some(13.5),
        solar_power_w: 4100.0,
        load_power_w: 1300.0,
        grid_power_w: 0.0,
        miners_online: 1,
        miners_total: 2,
        miner_power_w: 1400.0,
        alerts: vec![],
        notes: vec![],
    }
}

pub fn turn(id: i64, role: Role, content: &str) -> ConversationMessage {
    ConversationMessage {
        id,
        session_id: "s1".into(),
        role,
        content: content.into(),
        created_at: Utc::now(),
        agent_role: None,
        query_type: None,
        tokens: None,
        duration_ms: None,
    }
}

/// A small, already-assembled bundle.
pub fn bundle_for(query_type: QueryType) -> ContextBundle {
    ContextBundle {
        system_context: snapshot(82.0).render(),
        kb_passages: vec![],
        conversation_messages: vec![
            turn(1, Role::User, "What is my battery level?"),
            turn(2, Role::Assistant, "Your battery is at 82%."),
        ],
        user_context: String::new(),
        tokens: CategoryTokens::default(),
        total_tokens: 0,
        cache_hit: false,
        classification: Classification::new(query_type, 0.9),
        budget: BudgetPlanner::default().row(query_type),
        over_budget: false,
        truncated: false,
        degraded_sources: vec![],
        drops: vec![],
    }
}

/// Knowledge retriever that always errors.
pub struct FailingKnowledge;

#[async_trait]
impl KnowledgeRetriever for FailingKnowledge {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _: &str, _: usize, _: f32) -> Result<Vec<Passage>, KnowledgeError> {
        Err(KnowledgeError::Unavailable("connection refused".into()))
    }
}

/// Knowledge retriever that never answers.
pub struct HangingKnowledge;

#[async_trait]
impl KnowledgeRetriever for HangingKnowledge {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn search(&self, _: &str, _: usize, _: f32) -> Result<Vec<Passage>, KnowledgeError> {
        std::future::pending().await
    }
}
