//! Context sources for Voltwise: conversation history, the knowledge
//! base, and live system / user state.

pub mod conversation;
pub mod knowledge;
pub mod similarity;
pub mod state;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use conversation::InMemoryConversationStore;
pub use knowledge::{InMemoryKnowledgeBase, NoopKnowledge};
pub use state::{FileSystemState, ProfileDirectory, SharedSystemState};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConversationStore;
