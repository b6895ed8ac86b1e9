//! The `retrieve` tool — the reasoning agent's only window onto the
//! knowledge base. Modeled on the teacher's `KnowledgeSearchTool`, but
//! backed by the full hybrid-fusion chunk store instead of a flat FTS5
//! topic lookup.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use tutor_knowledge::retrieve::HybridRetriever;
use tutor_knowledge::types::{SearchFilters, SearchResult};

use super::{Tool, ToolResult};

/// Accumulates every `SearchResult` produced by `retrieve` calls made
/// during one turn. The `Tool` trait's fixed `ToolResult` return shape has
/// no room for structured citations, so the orchestrator hands each tool
/// instance a fresh collector and reads it back out after the tool loop
/// completes.
#[derive(Default)]
pub struct RetrievalCollector {
    results: Mutex<Vec<SearchResult>>,
}

impl RetrievalCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drain everything collected so far, oldest first.
    pub async fn take(&self) -> Vec<SearchResult> {
        std::mem::take(&mut *self.results.lock().await)
    }
}

#[derive(Deserialize)]
struct RetrieveInput {
    query: String,
    k: Option<usize>,
}

pub struct RetrieveTool {
    retriever: Arc<HybridRetriever>,
    collector: Arc<RetrievalCollector>,
}

impl RetrieveTool {
    pub fn new(retriever: Arc<HybridRetriever>, collector: Arc<RetrievalCollector>) -> Self {
        Self { retriever, collector }
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve"
    }

    fn description(&self) -> &str {
        "Search the maritime regulations knowledge base for passages relevant to a query. \
         Returns ranked excerpts with their document and page. Use this before answering any \
         question that depends on a specific rule, definition, or procedure."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Natural-language search query"},
                "k": {"type": "integer", "description": "Number of results to return (default 8)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let parsed: RetrieveInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };

        match self.retriever.search(&parsed.query, parsed.k, SearchFilters::default()).await {
            Ok(result) => {
                let summary = summarize(&result);
                self.collector.results.lock().await.push(result);
                ToolResult::success(summary)
            }
            Err(e) => ToolResult::error(format!("retrieval failed: {e}")),
        }
    }
}

fn summarize(result: &SearchResult) -> String {
    if result.hits.is_empty() {
        return "No relevant passages found.".to_string();
    }
    result
        .hits
        .iter()
        .map(|hit| format!("[{} p.{}] {}", hit.chunk.document_id, hit.chunk.page_number, hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use tutor_knowledge::embed::Embedder;
    use tutor_knowledge::retrieve::RetrievalConfig;
    use tutor_knowledge::store::KnowledgeStore;
    use tutor_knowledge::types::{BoundingBox, ContentType, DocumentChunk};

    struct EchoEmbedder;

    #[at]
    impl Embedder for EchoEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> tutor_knowledge::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    fn sample_chunk() -> DocumentChunk {
        let now = "2026-01-01T00:00:00Z".to_string();
        DocumentChunk {
            node_id: "n1".to_string(),
            document_id: "doc-1".to_string(),
            page_number: 1,
            chunk_index: 0,
            content: "rule 5 requires a proper lookout".to_string(),
            content_type: ContentType::Text,
            confidence: 1.0,
            embedding: vec![5.0, 0.0],
            image_url: Some("file:///doc-1/p1.png".to_string()),
            bounding_boxes: vec![BoundingBox { x0: 0.0, y0: 0.0, x1: 10.0, y1: 10.0 }],
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn execute_populates_collector_and_returns_summary() {
        let store = Arc::new(KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        store.register_document("doc-1", Some("COLREGs"), None, 1).unwrap();
        store.insert_chunks(&[sample_chunk()]).unwrap();

        let retriever = Arc::new(HybridRetriever::new(
            store,
            Arc::new(EchoEmbedder),
            RetrievalConfig::from_top_k(0.6, 8, None, None),
        ));
        let collector = RetrievalCollector::new();
        let tool = RetrieveTool::new(retriever, collector.clone());

        let result = tool.execute(serde_json::json!({"query": "lookout"})).await;
        assert!(!result.is_error);
        assert!(result.content.contains("rule 5"));

        let collected = collector.take().await;
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].hits.len(), 1);
    }

    #[tokio::test]
    async fn execute_rejects_malformed_input() {
        let store = Arc::new(KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let retriever = Arc::new(HybridRetriever::new(
            store,
            Arc::new(EchoEmbedder),
            RetrievalConfig::from_top_k(0.6, 8, None, None),
        ));
        let tool = RetrieveTool::new(retriever, RetrievalCollector::new());
        let result = tool.execute(serde_json::json!({"k": 3})).await;
        assert!(result.is_error);
    }
}
