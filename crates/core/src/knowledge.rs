//! Knowledge retrieval — ranked passages from the domain knowledge base.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::KnowledgeError;

/// A retrieved passage with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub doc_id: String,
    pub text: String,

    /// Similarity in `[0, 1]`.
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A document to index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub doc_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Read side of the knowledge base. This is all the request path needs.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `max_docs` passages scoring at least `min_similarity`, best first.
    async fn search(
        &self,
        query: &str,
        max_docs: usize,
        min_similarity: f32,
    ) -> std::result::Result<Vec<Passage>, KnowledgeError>;
}

/// A knowledge base that can also be (re)populated.
#[async_trait]
pub trait KnowledgeBase: KnowledgeRetriever {
    /// Index a document, replacing any chunks previously stored under its id.
    /// Returns the number of chunks indexed.
    async fn upsert(
        &self,
        document: KnowledgeDocument,
    ) -> std::result::Result<usize, KnowledgeError>;

    /// Number of indexed chunks.
    async fn count(&self) -> std::result::Result<usize, KnowledgeError>;
}
