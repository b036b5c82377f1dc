//! Error types for the Voltwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every failure the
//! request path can observe maps onto a [`FailureKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Voltwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Context source errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Cache storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("Knowledge query failed: {0}")]
    QueryFailed(String),

    #[error("Knowledge search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("Conversation store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("History lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Failures of the live system-state and user-profile sources.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed snapshot: {0}")]
    Malformed(String),

    #[error("Source timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// The failure taxonomy of the request path.
///
/// Most kinds never reach the user: they are logged and the request
/// degrades. Only completion failures (and source failures when degrading
/// is disabled) surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AmbiguousIntent,
    CacheUnavailable,
    KnowledgeUnavailable,
    HistoryUnavailable,
    SystemStateUnavailable,
    UserContextUnavailable,
    BudgetExceeded,
    ToolExecutionFailure,
    CompletionTimeout,
    CompletionFailed,
    RoutingFailure,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmbiguousIntent => "ambiguous_intent",
            Self::CacheUnavailable => "cache_unavailable",
            Self::KnowledgeUnavailable => "knowledge_unavailable",
            Self::HistoryUnavailable => "history_unavailable",
            Self::SystemStateUnavailable => "system_state_unavailable",
            Self::UserContextUnavailable => "user_context_unavailable",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ToolExecutionFailure => "tool_execution_failure",
            Self::CompletionTimeout => "completion_timeout",
            Self::CompletionFailed => "completion_failed",
            Self::RoutingFailure => "routing_failure",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Provider(ProviderError::Timeout(_)) => FailureKind::CompletionTimeout,
            Self::Provider(_) => FailureKind::CompletionFailed,
            Self::Cache(_) => FailureKind::CacheUnavailable,
            Self::Knowledge(_) => FailureKind::KnowledgeUnavailable,
            Self::History(_) => FailureKind::HistoryUnavailable,
            Self::Source(_) => FailureKind::SystemStateUnavailable,
            Self::Tool(_) => FailureKind::ToolExecutionFailure,
            Self::Config { .. } | Self::Serialization(_) | Self::Internal(_) => {
                FailureKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_provider_errors() {
        assert!(ProviderError::Timeout("60s".into()).is_transient());
        assert!(
            ProviderError::RateLimited {
                retry_after_secs: 1
            }
            .is_transient()
        );
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_transient());
    }

    #[test]
    fn errors_map_to_failure_kinds() {
        let err: Error = ProviderError::Timeout("slow".into()).into();
        assert_eq!(err.kind(), FailureKind::CompletionTimeout);

        let err: Error = KnowledgeError::Timeout { timeout_ms: 10 }.into();
        assert_eq!(err.kind(), FailureKind::KnowledgeUnavailable);

        let err: Error = CacheError::Unavailable("refused".into()).into();
        assert_eq!(err.kind(), FailureKind::CacheUnavailable);
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::ToolExecutionFailure).unwrap();
        assert_eq!(json, "\"tool_execution_failure\"");
        assert_eq!(FailureKind::RoutingFailure.to_string(), "routing_failure");
    }
}
