use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::error::{KnowledgeError, Result};

const RETRY_DELAYS_MS: [u64; 3] = [250, 500, 1000];

/// Turns text into dense vectors. One real implementation calls out to an
/// embeddings API; tests use a deterministic stand-in so chunking/retrieval
/// logic can be exercised without network access.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// Embeds `texts` one retry-group at a time, retrying only the entries that
/// failed in the prior attempt rather than the whole batch, per the
/// ingestion pipeline's retry/backoff policy (250ms, 500ms, 1s; 3 attempts).
pub async fn embed_with_retry(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    let mut pending: Vec<usize> = (0..texts.len()).collect();
    let mut attempt = 0;

    while !pending.is_empty() {
        let batch: Vec<String> = pending.iter().map(|&i| texts[i].clone()).collect();
        match embedder.embed_batch(&batch).await {
            Ok(embeddings) if embeddings.len() == pending.len() => {
                for (slot, embedding) in pending.iter().zip(embeddings.into_iter()) {
                    results[*slot] = Some(embedding);
                }
                pending.clear();
            }
            Ok(_) => {
                return Err(KnowledgeError::Embedding(
                    "embedder returned a mismatched batch size".to_string(),
                ));
            }
            Err(err) => {
                if attempt >= RETRY_DELAYS_MS.len() {
                    return Err(KnowledgeError::Embedding(format!(
                        "embedding failed after {} attempts: {err}",
                        attempt + 1
                    )));
                }
                warn!(attempt, %err, "embedding batch failed, retrying");
                sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                attempt += 1;
            }
        }
    }

    Ok(results.into_iter().map(|r| r.expect("all slots filled")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyEmbedder {
        dim: usize,
        failures_remaining: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(KnowledgeError::Embedding("transient".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.0; self.dim]).collect())
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_retry_budget() {
        let embedder = FlakyEmbedder {
            dim: 4,
            failures_remaining: AtomicUsize::new(2),
        };
        let out = embed_with_retry(&embedder, &["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retry_budget() {
        let embedder = FlakyEmbedder {
            dim: 4,
            failures_remaining: AtomicUsize::new(10),
        };
        let result = embed_with_retry(&embedder, &["a".to_string()]).await;
        assert!(result.is_err());
    }
}
