//! Knowledge search tool — ranked passages from the knowledge base.

use async_trait::async_trait;
use std::sync::Arc;
use voltwise_core::error::ToolError;
use voltwise_core::tool::{Tool, ToolResult};
use voltwise_core::KnowledgeRetriever;

const MAX_RESULTS: usize = 10;

pub struct KnowledgeSearchTool {
    retriever: Arc<dyn KnowledgeRetriever>,
    min_similarity: f32,
}

impl KnowledgeSearchTool {
    pub fn new(retriever: Arc<dyn KnowledgeRetriever>, min_similarity: f32) -> Self {
        Self {
            retriever,
            min_similarity,
        }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the energy knowledge base (battery chemistry, inverter behaviour, solar, \
         mining economics). Returns passages sorted by relevance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of passages to return (default 3, at most 10)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let max_results = arguments["max_results"]
            .as_u64()
            .unwrap_or(3)
            .min(MAX_RESULTS as u64) as usize;

        let passages = self
            .retriever
            .search(query, max_results, self.min_similarity)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let output = if passages.is_empty() {
            format!("No knowledge base entries matched '{query}'.")
        } else {
            passages
                .iter()
                .map(|p| format!("[{}] ({:.2}) {}", p.doc_id, p.score, p.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let data = serde_json::to_value(&passages).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(output, data))
    }
}
