//! SQLite conversation store.
//!
//! One table, `conversation_messages`, append-only. The integer primary
//! key doubles as the insertion order, so turns written in the same
//! millisecond still come back in the order they were appended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use voltwise_core::conversation::trim_oldest_to_fit;
use voltwise_core::error::HistoryError;
use voltwise_core::{
    AgentRole, CharHeuristicEstimator, ConversationMessage, ConversationStore, MessageMetadata,
    QueryType, Role, TokenEstimator,
};

pub struct SqliteConversationStore {
    pool: SqlitePool,
    estimator: Arc<dyn TokenEstimator>,
}

impl SqliteConversationStore {
    /// Open (or create) the history database at `path`.
    pub async fn new(path: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            estimator: Arc::new(CharHeuristicEstimator::default()),
        };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Count `max_tokens` in `recent` with `estimator`.
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    async fn run_migrations(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id   TEXT NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                agent_role   TEXT,
                query_type   TEXT,
                tokens       INTEGER,
                duration_ms  INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("conversation_messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversation_session ON conversation_messages(session_id, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("session index: {e}")))?;

        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationMessage, HistoryError> {
        let role: String = row.get("role");
        let role = Role::parse(&role)
            .ok_or_else(|| HistoryError::QueryFailed(format!("Unknown role '{role}'")))?;

        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| HistoryError::QueryFailed(format!("Bad created_at: {e}")))?;

        let agent_role: Option<String> = row.get("agent_role");
        let query_type: Option<String> = row.get("query_type");
        let tokens: Option<i64> = row.get("tokens");
        let duration_ms: Option<i64> = row.get("duration_ms");

        Ok(ConversationMessage {
            id: row.get("id"),
            session_id: row.get("session_id"),
            role,
            content: row.get("content"),
            created_at,
            agent_role: agent_role.as_deref().and_then(AgentRole::parse),
            query_type: query_type.as_deref().and_then(QueryType::parse),
            tokens: tokens.map(|t| t as u32),
            duration_ms: duration_ms.map(|d| d as u64),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn recent(
        &self,
        session_id: &str,
        max_messages: usize,
        max_tokens: usize,
    ) -> Result<Vec<ConversationMessage>, HistoryError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(max_messages as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::Unavailable(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            match Self::row_to_message(row) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(session_id, error = %e, "Skipping unreadable history row"),
            }
        }

        trim_oldest_to_fit(&mut messages, max_tokens, |m| self.estimator.estimate_message(m));
        Ok(messages)
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<ConversationMessage, HistoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO conversation_messages
                (session_id, role, content, created_at, agent_role, query_type, tokens, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at.to_rfc3339())
        .bind(metadata.agent_role.map(|r| r.as_str()))
        .bind(metadata.query_type.map(|q| q.as_str()))
        .bind(metadata.tokens.map(|t| t as i64))
        .bind(metadata.duration_ms.map(|d| d as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(e.to_string()))?;

        Ok(ConversationMessage {
            id: result.last_insert_rowid(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at,
            agent_role: metadata.agent_role,
            query_type: metadata.query_type,
            tokens: metadata.tokens,
            duration_ms: metadata.duration_ms,
        })
    }
}
