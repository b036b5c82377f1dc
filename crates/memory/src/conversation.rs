//! In-memory conversation store — for tests and ephemeral deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use voltwise_core::conversation::trim_oldest_to_fit;
use voltwise_core::error::HistoryError;
use voltwise_core::{
    CharHeuristicEstimator, ConversationMessage, ConversationStore, MessageMetadata, Role,
    TokenEstimator,
};

pub struct InMemoryConversationStore {
    sessions: Arc<RwLock<HashMap<String, Vec<ConversationMessage>>>>,
    next_id: AtomicI64,
    estimator: Arc<dyn TokenEstimator>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
            estimator: Arc::new(CharHeuristicEstimator::default()),
        }
    }

    /// Count `max_tokens` in `recent` with `estimator`.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn recent(
        &self,
        session_id: &str,
        max_messages: usize,
        max_tokens: usize,
    ) -> Result<Vec<ConversationMessage>, HistoryError> {
        let sessions = self.sessions.read().await;
        let Some(history) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };

        let start = history.len().saturating_sub(max_messages);
        let mut window = history[start..].to_vec();
        trim_oldest_to_fit(&mut window, max_tokens, |m| self.estimator.estimate_message(m));
        Ok(window)
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<ConversationMessage, HistoryError> {
        let message = ConversationMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            agent_role: metadata.agent_role,
            query_type: metadata.query_type,
            tokens: metadata.tokens,
            duration_ms: metadata.duration_ms,
        };
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}
