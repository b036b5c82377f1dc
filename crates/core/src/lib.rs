//! # Voltwise Core
//!
//! Domain types, traits, and error definitions for the Voltwise energy
//! assistant. This crate has **no framework dependencies**: it defines the
//! vocabulary (query types, agent roles, passages, conversation turns) and
//! the seams that the other crates implement against.
//!
//! ## Seams
//!
//! Every external collaborator of the request path is a trait here:
//! - [`CacheStore`] for assembled context bundles
//! - [`KnowledgeRetriever`] for ranked knowledge-base passages
//! - [`ConversationStore`] for per-session history
//! - [`SystemStateSource`] and [`UserContextSource`] for live state and profile
//! - [`Provider`] for LLM completion
//! - [`Tool`] for specialist capabilities
//!
//! Implementations are injected by the process entry point, which keeps
//! the engine testable with in-memory stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod query;
pub mod token;
pub mod cache;
pub mod knowledge;
pub mod conversation;
pub mod system;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FailureKind, Result};
pub use message::{ConversationMessage, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolCallRecord, ToolRegistry, ToolResult};
pub use query::{AgentRole, Classification, PriorTurn, Query, QueryType};
pub use token::{CharHeuristicEstimator, TokenEstimator};
pub use cache::{CacheEntry, CacheStore};
pub use knowledge::{KnowledgeBase, KnowledgeDocument, KnowledgeRetriever, Passage};
pub use conversation::{ConversationStore, MessageMetadata};
pub use system::{SystemSnapshot, SystemStateSource, UserContextSource};
