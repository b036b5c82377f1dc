//! Conversation store trait — append-only per-session history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::HistoryError;
use crate::message::{ConversationMessage, Role};
use crate::query::{AgentRole, QueryType};

/// Optional facts recorded alongside a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<AgentRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// The most recent turns of a session, oldest first.
    ///
    /// At most `max_messages` are returned; the oldest are then dropped
    /// until the rest fit in `max_tokens`.
    async fn recent(
        &self,
        session_id: &str,
        max_messages: usize,
        max_tokens: usize,
    ) -> std::result::Result<Vec<ConversationMessage>, HistoryError>;

    /// Append a turn and return it as stored.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> std::result::Result<ConversationMessage, HistoryError>;
}

/// Drop turns from the front until the rest fit in `max_tokens`.
pub fn trim_oldest_to_fit(
    messages: &mut Vec<ConversationMessage>,
    max_tokens: usize,
    estimate: impl Fn(&ConversationMessage) -> usize,
) -> usize {
    let mut total: usize = messages.iter().map(&estimate).sum();
    let mut dropped = 0;
    while total > max_tokens && !messages.is_empty() {
        total -= estimate(&messages.remove(0));
        dropped += 1;
    }
    dropped
}
