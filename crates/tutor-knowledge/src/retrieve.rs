use std::sync::Arc;

use tracing::instrument;

use crate::embed::Embedder;
use crate::error::Result;
use crate::store::KnowledgeStore;
use crate::types::{SearchFilters, SearchResult};

/// Tunables for hybrid retrieval, mirroring `RetrievalConfig`.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub dense_weight: f64,
    pub top_k: usize,
    pub dense_candidates: usize,
    pub lexical_candidates: usize,
}

impl RetrievalConfig {
    pub fn from_top_k(dense_weight: f64, top_k: usize, dense_candidates: Option<usize>, lexical_candidates: Option<usize>) -> Self {
        Self {
            dense_weight,
            top_k,
            dense_candidates: dense_candidates.unwrap_or(top_k * 4),
            lexical_candidates: lexical_candidates.unwrap_or(top_k * 4),
        }
    }
}

/// Embeds a query and runs it through `KnowledgeStore::hybrid_search`,
/// the single entry point the `retrieve` agent tool and any future
/// programmatic caller should use — keeping fusion weights and candidate
/// pool sizes in one place rather than re-derived at each call site.
pub struct HybridRetriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(store: Arc<KnowledgeStore>, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self { store, embedder, config }
    }

    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &str, k: Option<usize>, filters: SearchFilters) -> Result<SearchResult> {
        let top_k = k.unwrap_or(self.config.top_k);
        let query_embedding = self
            .embedder
            .embed_batch(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        self.store.hybrid_search(
            query,
            &query_embedding,
            top_k,
            self.config.dense_candidates,
            self.config.lexical_candidates,
            self.config.dense_weight,
            &filters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, ContentType, DocumentChunk};
    use async_trait::async_trait;

    struct EchoEmbedder;

    #[async_trait]
    impl Embedder for EchoEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn search_returns_citations_for_matching_chunks() {
        let store = Arc::new(KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        store.register_document("doc-1", Some("COLREGs"), None, 1).unwrap();
        let now = "2026-01-01T00:00:00Z".to_string();
        store
            .insert_chunks(&[DocumentChunk {
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
            }])
            .unwrap();

        let retriever = HybridRetriever::new(
            store,
            Arc::new(EchoEmbedder),
            RetrievalConfig::from_top_k(0.6, 8, None, None),
        );
        let result = retriever.search("lookout", None, SearchFilters::default()).await.unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.evidence_images.len(), 1);
    }
}
