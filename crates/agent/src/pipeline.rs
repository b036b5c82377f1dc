//! The request path: classify → plan → assemble → route → record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use voltwise_core::{
    AgentRole, ConversationStore, FailureKind, MessageMetadata, PriorTurn, Query, QueryType, Role,
    ToolCallRecord,
};

use crate::budget::BudgetPlanner;
use crate::classifier::QueryClassifier;
use crate::context::{AssemblyError, ContextAssembler};
use crate::router::AgentRouter;
use crate::specialist::AgentError;

/// Turns inspected when looking for the previous answer.
const PRIOR_TURN_WINDOW: usize = 4;

/// A successful answer with its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
    /// Display name of the specialist that answered.
    pub agent_role: String,
    pub query_type: QueryType,
    pub context_tokens: usize,
    pub cache_hit: bool,
    pub duration_ms: u64,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

/// A failed request, with whatever was known when it failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AskError {
    pub kind: FailureKind,
    pub message: String,
    pub session_id: String,
    pub query_type: Option<QueryType>,
    pub agent_role: Option<AgentRole>,
    pub cache_hit: bool,
    pub context_tokens: usize,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl AskError {
    fn from_assembly(err: AssemblyError, session_id: &str, query_type: QueryType) -> Self {
        Self {
            kind: err.kind,
            message: err.to_string(),
            session_id: session_id.to_string(),
            query_type: Some(query_type),
            agent_role: None,
            cache_hit: false,
            context_tokens: 0,
            tool_calls: Vec::new(),
        }
    }
}

pub struct AskPipeline {
    classifier: QueryClassifier,
    planner: BudgetPlanner,
    assembler: ContextAssembler,
    router: AgentRouter,
    conversation: Arc<dyn ConversationStore>,
    history_timeout: Duration,
}

impl AskPipeline {
    pub fn new(
        classifier: QueryClassifier,
        planner: BudgetPlanner,
        assembler: ContextAssembler,
        router: AgentRouter,
        conversation: Arc<dyn ConversationStore>,
    ) -> Self {
        let history_timeout = assembler.settings().timeouts.conversation;
        Self {
            classifier,
            planner,
            assembler,
            router,
            conversation,
            history_timeout,
        }
    }

    pub fn conversation(&self) -> &Arc<dyn ConversationStore> {
        &self.conversation
    }

    /// Answer one message. A missing session id starts a new session.
    pub async fn ask(
        &self,
        message: &str,
        session_id: Option<String>,
    ) -> Result<AskResponse, AskError> {
        let started = Instant::now();
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let prior = self.prior_turn(&session_id).await;
        let classification = self.classifier.classify_with_history(message, prior);
        let budget = self.planner.plan(&classification);
        let query = Query::new(message, session_id.clone());
        let query_type = classification.query_type;

        info!(
            session_id = %session_id,
            query_type = %query_type,
            confidence = classification.confidence,
            inherited = classification.inherited,
            "Query classified"
        );

        let bundle = self
            .assembler
            .assemble(&query, &classification, &budget)
            .await
            .map_err(|e| {
                error!(
                    kind = %e.kind,
                    session_id = %session_id,
                    error = %e,
                    "Context assembly failed"
                );
                AskError::from_assembly(e, &session_id, query_type)
            })?;

        let result = match self.router.route(&query, &bundle).await {
            Ok(result) => result,
            Err(err) => {
                let kind = err.kind();
                let AgentError { role, source, tool_calls, .. } = err;
                error!(
                    kind = %kind,
                    session_id = %session_id,
                    query_type = %query_type,
                    agent_role = %role,
                    error = %source,
                    "Specialist failed"
                );
                return Err(AskError {
                    kind,
                    message: format!("{role} could not answer: {source}"),
                    session_id,
                    query_type: Some(query_type),
                    agent_role: Some(role),
                    cache_hit: bundle.cache_hit,
                    context_tokens: bundle.total_tokens,
                    tool_calls,
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.record(
            &session_id,
            message,
            &result.answer,
            result.agent_role,
            query_type,
            result.tokens_used,
            duration_ms,
        )
        .await;

        info!(
            session_id = %session_id,
            query_type = %query_type,
            agent_role = %result.agent_role,
            tokens = bundle.total_tokens,
            cache_hit = result.cache_hit,
            duration_ms,
            "Query answered"
        );

        Ok(AskResponse {
            response: result.answer,
            agent_role: result.agent_role.display_name().to_string(),
            query_type: result.query_type,
            context_tokens: bundle.total_tokens,
            cache_hit: result.cache_hit,
            duration_ms,
            session_id,
            tool_calls: result.tool_calls,
        })
    }

    /// The type of the session's last classified assistant turn.
    async fn prior_turn(&self, session_id: &str) -> Option<PriorTurn> {
        let recent = tokio::time::timeout(
            self.history_timeout,
            self.conversation.recent(session_id, PRIOR_TURN_WINDOW, usize::MAX),
        )
        .await;
        let turns = match recent {
            Ok(Ok(turns)) => turns,
            Ok(Err(e)) => {
                warn!(
                    kind = %FailureKind::HistoryUnavailable,
                    error = %e,
                    "Prior turn lookup failed"
                );
                return None;
            }
            Err(_) => {
                warn!(kind = %FailureKind::HistoryUnavailable, "Prior turn lookup timed out");
                return None;
            }
        };
        turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .and_then(|t| {
                t.query_type.map(|query_type| PriorTurn {
                    query_type,
                    agent_role: t.agent_role,
                })
            })
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        agent_role: AgentRole,
        query_type: QueryType,
        tokens: u32,
        duration_ms: u64,
    ) {
        let user = MessageMetadata {
            query_type: Some(query_type),
            ..Default::default()
        };
        if let Err(e) = self.conversation.append(session_id, Role::User, question, user).await {
            warn!(kind = %FailureKind::HistoryUnavailable, error = %e, "Failed to record question");
            return;
        }
        let assistant = MessageMetadata {
            agent_role: Some(agent_role),
            query_type: Some(query_type),
            tokens: Some(tokens),
            duration_ms: Some(duration_ms),
        };
        if let Err(e) = self
            .conversation
            .append(session_id, Role::Assistant, answer, assistant)
            .await
        {
            warn!(kind = %FailureKind::HistoryUnavailable, error = %e, "Failed to record answer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AssemblerSettings, ContextSources};
    use crate::router::{Specialists, ToolSources};
    use crate::specialist::SpecialistSettings;
    use crate::test_helpers::{
        make_text_response, make_tool_call, make_tool_call_response, snapshot, FailingKnowledge,
        FailingProvider, SequentialMockProvider,
    };
    use voltwise_cache::InMemoryCache;
    use voltwise_config::RouterConfig;
    use voltwise_core::error::ProviderError;
    use voltwise_core::{CharHeuristicEstimator, KnowledgeRetriever, Provider};
    use voltwise_memory::{
        InMemoryConversationStore, NoopKnowledge, ProfileDirectory, SharedSystemState,
    };

    fn pipeline_with(
        provider: Arc<dyn Provider>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        settings: AssemblerSettings,
    ) -> AskPipeline {
        let system = Arc::new(SharedSystemState::new(Some(snapshot(82.0))));
        let conversation = Arc::new(InMemoryConversationStore::new());
        let assembler = ContextAssembler::new(
            ContextSources {
                system: system.clone(),
                knowledge: knowledge.clone(),
                conversation: conversation.clone(),
                user: Arc::new(ProfileDirectory::new(None, Default::default())),
            },
            Arc::new(InMemoryCache::new(32)),
            Arc::new(CharHeuristicEstimator::default()),
            settings,
        );
        let specialists = Specialists::build(
            provider,
            &SpecialistSettings {
                model: "mock-model".into(),
                temperature: 0.3,
                max_tokens: None,
                max_tool_iterations: 4,
            },
            &ToolSources {
                system,
                knowledge,
                min_similarity: 0.35,
                tool_timeout: Duration::from_secs(5),
            },
        );
        AskPipeline::new(
            QueryClassifier::default(),
            BudgetPlanner::default(),
            assembler,
            AgentRouter::from_config(&RouterConfig::default(), specialists),
            conversation,
        )
    }

    fn pipeline(provider: Arc<dyn Provider>) -> AskPipeline {
        pipeline_with(provider, Arc::new(NoopKnowledge), AssemblerSettings::default())
    }

    #[tokio::test]
    async fn answers_and_records_the_exchange() {
        let provider = Arc::new(SequentialMockProvider::single_text("Your battery is at 82%."));
        let pipeline = pipeline(provider);

        let response = pipeline.ask("What is my battery level?", Some("s1".into())).await.unwrap();
        assert_eq!(response.response, "Your battery is at 82%.");
        assert_eq!(response.agent_role, "Solar Controller");
        assert_eq!(response.query_type, QueryType::System);
        assert!(!response.cache_hit);
        assert!(response.context_tokens > 0);

        let history = pipeline.conversation().recent("s1", 10, usize::MAX).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].agent_role, Some(AgentRole::SolarController));
        assert_eq!(history[1].query_type, Some(QueryType::System));
    }

    #[tokio::test]
    async fn cached_context_stays_within_its_session() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Alice, your battery is at 82%."),
            make_text_response("Bob, your battery is at 82%."),
        ]));
        let pipeline = pipeline(provider.clone());
        pipeline
            .conversation()
            .append("alice", Role::User, "My gate code is 4711", MessageMetadata::default())
            .await
            .unwrap();

        pipeline.ask("What is my battery level?", Some("alice".into())).await.unwrap();
        let bob = pipeline.ask("What is my battery level?", Some("bob".into())).await.unwrap();

        assert!(!bob.cache_hit);
        let request = &provider.requests()[1];
        assert!(request.messages.iter().all(|m| !m.content.contains("4711")));
    }

    #[tokio::test]
    async fn missing_session_gets_a_fresh_id() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("one"),
            make_text_response("two"),
        ]));
        let pipeline = pipeline(provider);
        let a = pipeline.ask("hello", None).await.unwrap();
        let b = pipeline.ask("hello", Some("  ".into())).await.unwrap();
        assert!(uuid::Uuid::parse_str(&a.session_id).is_ok());
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn follow_up_inherits_and_routes_to_same_specialist() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Your battery is at 82%."),
            make_text_response("Yes, 82% is well within the safe range."),
        ]));
        let pipeline = pipeline(provider.clone());

        pipeline.ask("What is my battery level?", Some("s1".into())).await.unwrap();
        let follow_up = pipeline.ask("Is that safe?", Some("s1".into())).await.unwrap();

        assert_eq!(follow_up.query_type, QueryType::System);
        assert_eq!(follow_up.agent_role, "Solar Controller");
        // The previous exchange was part of the prompt.
        let second = &provider.requests()[1];
        assert!(second.messages.iter().any(|m| m.content == "Your battery is at 82%."));
    }

    #[tokio::test]
    async fn completion_failure_reports_context_and_partial_tools() {
        let provider = Arc::new(FailingProvider::after(
            vec![make_tool_call_response(
                vec![make_tool_call("telemetry_read", serde_json::json!({}))],
                "",
            )],
            ProviderError::Timeout("60s".into()),
        ));
        let pipeline = pipeline(provider);

        let err = pipeline.ask("What is my battery level?", Some("s1".into())).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::CompletionTimeout);
        assert_eq!(err.query_type, Some(QueryType::System));
        assert_eq!(err.agent_role, Some(AgentRole::SolarController));
        assert!(err.context_tokens > 0);
        assert_eq!(err.tool_calls.len(), 1);
        assert!(err.tool_calls[0].success);

        // Nothing is recorded for a failed request.
        let history = pipeline.conversation().recent("s1", 10, usize::MAX).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn provider_rejection_is_completion_failed() {
        let provider = Arc::new(FailingProvider::always(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )));
        let err = pipeline(provider).ask("hello", None).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::CompletionFailed);
    }

    #[tokio::test]
    async fn source_failure_surfaces_when_fallback_disabled() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let settings = AssemblerSettings {
            fallback_on_source_error: false,
            ..Default::default()
        };
        let pipeline = pipeline_with(provider.clone(), Arc::new(FailingKnowledge), settings);

        let err = pipeline.ask("Explain LiFePO4 degradation", None).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::KnowledgeUnavailable);
        assert_eq!(err.query_type, Some(QueryType::Research));
        assert_eq!(provider.call_count(), 0);
    }
}
