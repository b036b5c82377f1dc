//! Specialist agents: one role, one tool registry, one reasoning loop.
//!
//! The loop follows **Ask → Act → Observe**:
//!
//! 1. Send the role's instructions, the rendered context bundle, the
//!    conversation window and the query to the LLM with the role's tools
//! 2. **If tool calls**: invoke each one in order through the registry,
//!    append the results, and ask again
//! 3. **If text only**: that is the answer
//!
//! After `max_tool_iterations` rounds the last assistant text is returned
//! as the answer.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use voltwise_core::error::ProviderError;
use voltwise_core::{
    AgentRole, FailureKind, Message, Provider, ProviderRequest, Query, QueryType, Role, ToolCall,
    ToolCallRecord, ToolRegistry,
};

use crate::context::ContextBundle;

const SOLAR_CONTROLLER_PROMPT: &str = "You are the Solar Controller for a home solar, battery \
and bitcoin mining installation. You answer questions about the live state of the system: \
battery state of charge, solar production, household load, grid exchange and miner status. \
Quote figures from the system state below and call telemetry_read when you need fresher \
numbers. Use miner_coordinator when asked whether the miners should run. Be brief and exact.";

const ENERGY_ORCHESTRATOR_PROMPT: &str = "You are the Energy Orchestrator for a home solar, \
battery and bitcoin mining installation. You plan: when to charge or discharge the battery, \
when to run the miners, how to use solar surplus and off-peak grid power. Base every \
recommendation on battery_optimizer and miner_coordinator results rather than guesses, and \
say which figures you used.";

const RESEARCH_AGENT_PROMPT: &str = "You are the Research Agent for a home solar, battery and \
bitcoin mining installation. You explain how things work: battery chemistry and safety, \
inverter behaviour, solar engineering, mining economics. Ground your answer in the retrieved \
knowledge below and call knowledge_search when it is not enough. Say so when the knowledge \
base does not cover the question.";

const EXHAUSTED_ANSWER: &str =
    "I could not finish working this out within the allowed number of steps.";

fn instructions(role: AgentRole) -> &'static str {
    match role {
        AgentRole::SolarController => SOLAR_CONTROLLER_PROMPT,
        AgentRole::EnergyOrchestrator => ENERGY_ORCHESTRATOR_PROMPT,
        AgentRole::ResearchAgent => RESEARCH_AGENT_PROMPT,
    }
}

/// LLM parameters shared by all specialists.
#[derive(Debug, Clone)]
pub struct SpecialistSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_tool_iterations: usize,
}

/// What a specialist produced for one query.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_role: AgentRole,
    pub query_type: QueryType,
    /// Whether the context came from the cache.
    pub cache_hit: bool,
    pub answer: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tokens_used: u32,
    pub iterations: usize,
    pub duration_ms: u64,
}

/// Completion failed after retries. Carries what was done before it.
#[derive(Debug, thiserror::Error)]
#[error("{role} could not complete: {source}")]
pub struct AgentError {
    pub role: AgentRole,
    pub source: ProviderError,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tokens_used: u32,
}

impl AgentError {
    pub fn kind(&self) -> FailureKind {
        match self.source {
            ProviderError::Timeout(_) => FailureKind::CompletionTimeout,
            _ => FailureKind::CompletionFailed,
        }
    }
}

pub struct Specialist {
    role: AgentRole,
    tools: ToolRegistry,
    provider: Arc<dyn Provider>,
    settings: SpecialistSettings,
}

impl Specialist {
    pub fn new(
        role: AgentRole,
        tools: ToolRegistry,
        provider: Arc<dyn Provider>,
        settings: SpecialistSettings,
    ) -> Self {
        Self {
            role,
            tools,
            provider,
            settings,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    fn system_prompt(&self, bundle: &ContextBundle) -> String {
        let sections = bundle.render_sections();
        if sections.is_empty() {
            instructions(self.role).to_string()
        } else {
            format!("{}\n\n{}", instructions(self.role), sections)
        }
    }

    fn initial_messages(&self, query: &Query, bundle: &ContextBundle) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt(bundle))];
        for turn in &bundle.conversation_messages {
            match turn.role {
                Role::User => messages.push(Message::user(&turn.content)),
                Role::Assistant => messages.push(Message::assistant(&turn.content)),
                Role::System | Role::Tool => {}
            }
        }
        messages.push(Message::user(&query.text));
        messages
    }

    /// Answer `query` with the given context.
    pub async fn run(
        &self,
        query: &Query,
        bundle: &ContextBundle,
    ) -> Result<AgentResult, AgentError> {
        let started = Instant::now();
        let mut messages = self.initial_messages(query, bundle);
        let definitions = self.tools.definitions();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut tokens_used = 0u32;
        let mut last_text = String::new();
        let max_iterations = self.settings.max_tool_iterations.max(1);

        for iteration in 1..=max_iterations {
            debug!(role = %self.role, iteration, "Specialist iteration");

            let request = ProviderRequest {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                tools: definitions.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(source) => {
                    return Err(AgentError {
                        role: self.role,
                        source,
                        tool_calls: records,
                        tokens_used,
                    });
                }
            };
            if let Some(usage) = &response.usage {
                tokens_used += usage.total_tokens;
            }
            if !response.message.content.trim().is_empty() {
                last_text = response.message.content.clone();
            }

            if response.message.tool_calls.is_empty() {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    role = %self.role,
                    iterations = iteration,
                    tool_calls = records.len(),
                    tokens = tokens_used,
                    duration_ms,
                    "Specialist answered"
                );
                return Ok(AgentResult {
                    agent_role: self.role,
                    query_type: bundle.classification.query_type,
                    cache_hit: bundle.cache_hit,
                    answer: response.message.content,
                    tool_calls: records,
                    tokens_used,
                    iterations: iteration,
                    duration_ms,
                });
            }

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            // One at a time, in the order the model asked.
            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };
                let record = self.tools.invoke(&call).await;
                let content = if record.success {
                    record.output.clone()
                } else {
                    warn!(
                        kind = %FailureKind::ToolExecutionFailure,
                        role = %self.role,
                        tool = %record.tool,
                        error = record.error.as_deref().unwrap_or_default(),
                        "Tool call failed; continuing"
                    );
                    format!("Error: {}", record.error.as_deref().unwrap_or("tool failed"))
                };
                messages.push(Message::tool_result(&tc.id, content));
                records.push(record);
            }
        }

        warn!(
            role = %self.role,
            iterations = max_iterations,
            "Max tool iterations reached, answering with last text"
        );
        let answer = if last_text.is_empty() { EXHAUSTED_ANSWER.to_string() } else { last_text };
        Ok(AgentResult {
            agent_role: self.role,
            query_type: bundle.classification.query_type,
            cache_hit: bundle.cache_hit,
            answer,
            tool_calls: records,
            tokens_used,
            iterations: max_iterations,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        bundle_for, make_text_response, make_tool_call, make_tool_call_response,
        FailingProvider, SequentialMockProvider,
    };
    use std::time::Duration;
    use voltwise_core::QueryType;
    use voltwise_tools::BatteryOptimizerTool;

    fn settings(max_tool_iterations: usize) -> SpecialistSettings {
        SpecialistSettings {
            model: "mock-model".into(),
            temperature: 0.3,
            max_tokens: Some(512),
            max_tool_iterations,
        }
    }

    fn orchestrator(provider: Arc<dyn Provider>, max_tool_iterations: usize) -> Specialist {
        let tools = ToolRegistry::new(Duration::from_secs(5))
            .with(Box::new(BatteryOptimizerTool::new(None)));
        Specialist::new(
            AgentRole::EnergyOrchestrator,
            tools,
            provider,
            settings(max_tool_iterations),
        )
    }

    #[tokio::test]
    async fn plain_answer_without_tools() {
        let provider = Arc::new(SequentialMockProvider::single_text("Battery is at 82%."));
        let specialist = orchestrator(provider.clone(), 4);
        let query = Query::new("What is my battery level?", "s1");

        let result = specialist.run(&query, &bundle_for(QueryType::System)).await.unwrap();
        assert_eq!(result.answer, "Battery is at 82%.");
        assert_eq!(result.agent_role, AgentRole::EnergyOrchestrator);
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.iterations, 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call(
                "battery_optimizer",
                serde_json::json!({"soc_pct": 40, "surplus_w": 1000}),
            )],
            "Let me check.",
            "Charge at 1000 W now.",
        ));
        let specialist = orchestrator(provider.clone(), 4);
        let query = Query::new("Should I charge now?", "s1");

        let result = specialist.run(&query, &bundle_for(QueryType::Planning)).await.unwrap();
        assert_eq!(result.answer, "Charge at 1000 W now.");
        assert_eq!(result.tool_calls.len(), 1);
        assert!(result.tool_calls[0].success);
        assert!(result.tool_calls[0].output.starts_with("Charge at 1000 W"));
        assert_eq!(result.tokens_used, 30);

        // The tool output went back to the model.
        let requests = provider.requests();
        let last = requests.last().unwrap();
        assert!(last.messages.iter().any(|m| m.role == Role::Tool && m.content.contains("1000 W")));
    }

    #[tokio::test]
    async fn unowned_tool_is_recorded_and_loop_continues() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("knowledge_search", serde_json::json!({"query": "lfp"}))],
            "",
            "I can only plan, not research.",
        ));
        let specialist = orchestrator(provider, 4);
        let result = specialist
            .run(&Query::new("plan", "s1"), &bundle_for(QueryType::Planning))
            .await
            .unwrap();

        assert_eq!(result.answer, "I can only plan, not research.");
        let record = &result.tool_calls[0];
        assert!(!record.success);
        assert!(record.error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn iteration_cap_returns_last_text() {
        let call = || {
            make_tool_call(
                "battery_optimizer",
                serde_json::json!({"soc_pct": 40, "surplus_w": 0}),
            )
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call()], "Checking once."),
            make_tool_call_response(vec![call()], "Checking twice."),
            make_text_response("never reached"),
        ]));
        let specialist = orchestrator(provider.clone(), 2);
        let result = specialist
            .run(&Query::new("plan", "s1"), &bundle_for(QueryType::Planning))
            .await
            .unwrap();

        assert_eq!(result.answer, "Checking twice.");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn completion_failure_keeps_partial_tool_calls() {
        let provider = Arc::new(FailingProvider::after(
            vec![make_tool_call_response(
                vec![make_tool_call(
                    "battery_optimizer",
                    serde_json::json!({"soc_pct": 50, "surplus_w": 200}),
                )],
                "",
            )],
            ProviderError::Timeout("60s".into()),
        ));
        let specialist = orchestrator(provider, 4);
        let err = specialist
            .run(&Query::new("plan", "s1"), &bundle_for(QueryType::Planning))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::CompletionTimeout);
        assert_eq!(err.role, AgentRole::EnergyOrchestrator);
        assert_eq!(err.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn prompt_carries_context_and_history() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let specialist = orchestrator(provider.clone(), 4);
        let bundle = bundle_for(QueryType::System);
        specialist.run(&Query::new("Is that safe?", "s1"), &bundle).await.unwrap();

        let requests = provider.requests();
        let messages = &requests[0].messages;
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are the Energy Orchestrator"));
        assert!(messages[0].content.contains("[System State]"));
        assert_eq!(messages.len(), bundle.conversation_messages.len() + 2);
        assert_eq!(messages.last().unwrap().content, "Is that safe?");
        assert_eq!(requests[0].tools.len(), 1);
    }
}
