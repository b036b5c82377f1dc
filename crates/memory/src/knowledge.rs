//! Knowledge base implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use voltwise_core::error::KnowledgeError;
use voltwise_core::{KnowledgeBase, KnowledgeDocument, KnowledgeRetriever, Passage};

use crate::similarity::{chunk_text, score, term_vector, tokenize};

struct Chunk {
    doc_id: String,
    parent_id: String,
    text: String,
    source: Option<String>,
    terms: HashMap<String, f32>,
}

/// An in-process knowledge base with lexical scoring.
pub struct InMemoryKnowledgeBase {
    chunks: Arc<RwLock<Vec<Chunk>>>,
    chunk_max_chars: usize,
}

impl InMemoryKnowledgeBase {
    pub fn new(chunk_max_chars: usize) -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
            chunk_max_chars,
        }
    }

    /// Index every `.md` and `.txt` file in `dir`. The file stem is the
    /// document id. Returns the number of documents indexed.
    pub async fn load_dir(&self, dir: &Path) -> Result<usize, KnowledgeError> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            KnowledgeError::Unavailable(format!("Cannot read {}: {e}", dir.display()))
        })?;

        let mut loaded = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KnowledgeError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            let is_doc = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            );
            if !is_doc {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    self.upsert(KnowledgeDocument {
                        doc_id: stem.to_string(),
                        text,
                        source: Some(path.display().to_string()),
                    })
                    .await?;
                    loaded += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }

        info!(dir = %dir.display(), documents = loaded, "Knowledge base loaded");
        Ok(loaded)
    }
}

impl Default for InMemoryKnowledgeBase {
    fn default() -> Self {
        Self::new(1200)
    }
}

#[async_trait]
impl KnowledgeRetriever for InMemoryKnowledgeBase {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        query: &str,
        max_docs: usize,
        min_similarity: f32,
    ) -> Result<Vec<Passage>, KnowledgeError> {
        if max_docs == 0 {
            return Ok(Vec::new());
        }

        let query_terms = term_vector(&tokenize(query));
        let chunks = self.chunks.read().await;
        let corpus: Vec<&HashMap<String, f32>> = chunks.iter().map(|c| &c.terms).collect();

        let mut passages: Vec<Passage> = chunks
            .iter()
            .filter_map(|chunk| {
                let s = score(&query_terms, &chunk.terms, &corpus);
                (s >= min_similarity && s > 0.0).then(|| Passage {
                    doc_id: chunk.doc_id.clone(),
                    text: chunk.text.clone(),
                    score: s,
                    source: chunk.source.clone(),
                })
            })
            .collect();

        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        passages.truncate(max_docs);

        debug!(hits = passages.len(), min_similarity, "Knowledge search complete");
        Ok(passages)
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn upsert(&self, document: KnowledgeDocument) -> Result<usize, KnowledgeError> {
        let pieces = chunk_text(&document.text, self.chunk_max_chars);
        let multi = pieces.len() > 1;
        let new_chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                doc_id: if multi {
                    format!("{}#{}", document.doc_id, i + 1)
                } else {
                    document.doc_id.clone()
                },
                parent_id: document.doc_id.clone(),
                terms: term_vector(&tokenize(&text)),
                text,
                source: document.source.clone(),
            })
            .collect();

        let count = new_chunks.len();
        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.parent_id != document.doc_id);
        chunks.extend(new_chunks);
        Ok(count)
    }

    async fn count(&self) -> Result<usize, KnowledgeError> {
        Ok(self.chunks.read().await.len())
    }
}

/// A knowledge base with nothing in it.
pub struct NoopKnowledge;

#[async_trait]
impl KnowledgeRetriever for NoopKnowledge {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(
        &self,
        _query: &str,
        _max_docs: usize,
        _min: f32,
    ) -> Result<Vec<Passage>, KnowledgeError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            doc_id: id.into(),
            text: text.into(),
            source: None,
        }
    }

    async fn seeded() -> InMemoryKnowledgeBase {
        let kb = InMemoryKnowledgeBase::default();
        kb.upsert(doc(
            "lifepo4",
            "LiFePO4 cells tolerate deep discharge and last thousands of cycles.",
        ))
        .await
        .unwrap();
        kb.upsert(doc(
            "miners",
            "Bitcoin miners are a flexible load that can soak up solar surplus.",
        ))
        .await
        .unwrap();
        kb.upsert(doc("inverter", "Hybrid inverters route solar power to loads or the grid."))
            .await
            .unwrap();
        kb
    }

    #[tokio::test]
    async fn search_returns_best_first() {
        let kb = seeded().await;
        let hits = kb.search("lifepo4 discharge cycles", 3, 0.1).await.unwrap();
        assert_eq!(hits[0].doc_id, "lifepo4");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn threshold_filters_weak_matches() {
        let kb = seeded().await;
        let hits = kb.search("solar surplus miners", 5, 0.5).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|p| p.score >= 0.5));
        assert!(hits.iter().all(|p| p.doc_id != "lifepo4"));
    }

    #[tokio::test]
    async fn unrelated_query_is_empty() {
        let kb = seeded().await;
        assert!(kb.search("What is my battery level?", 5, 0.35).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_max_docs_is_empty() {
        let kb = seeded().await;
        assert!(kb.search("lifepo4", 0, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_previous_chunks() {
        let kb = InMemoryKnowledgeBase::new(30);
        let long = "First part about batteries.\n\nSecond part about inverters.";
        assert_eq!(kb.upsert(doc("guide", long)).await.unwrap(), 2);
        assert_eq!(kb.count().await.unwrap(), 2);

        kb.upsert(doc("guide", "Short now.")).await.unwrap();
        assert_eq!(kb.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_dir_indexes_markdown_and_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("safety.md"),
            "Never charge LiFePO4 below freezing.",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Miners idle at night.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let kb = InMemoryKnowledgeBase::default();
        assert_eq!(kb.load_dir(dir.path()).await.unwrap(), 2);
        let hits = kb.search("charge below freezing", 1, 0.3).await.unwrap();
        assert_eq!(hits[0].doc_id, "safety");
        assert!(hits[0].source.as_deref().unwrap().ends_with("safety.md"));
    }

    #[tokio::test]
    async fn load_missing_dir_is_unavailable() {
        let kb = InMemoryKnowledgeBase::default();
        let err = kb.load_dir(Path::new("/nonexistent/kb")).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn noop_is_always_empty() {
        assert!(NoopKnowledge.search("anything", 5, 0.0).await.unwrap().is_empty());
    }
}
