//! vector retriever (C3): embed the query remotely, then query the
//! backend's ANN index with the returned vector.
//!
//! the embedding sub-step retries up to 3 attempts with exponential
//! backoff capped at 10s (grounded on the `bm25_retry_backoff_ms: Vec<u64>`
//! lenient-retry pattern from the wider retrieval corpus), adapted to the
//! teacher's `reqwest`-based client style in `embedding.rs`.

use crate::backend::{BackendError, SearchBackend};
use crate::error::PipelineError;
use crate::model::{Candidate, EmbeddingStats, Filters};
use crate::providers::{Embedder, EmbeddingError};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_EMBED_ATTEMPTS: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(10);

fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// embed `query` with up to `MAX_EMBED_ATTEMPTS` attempts, exponential
/// backoff between attempts capped at 10s. on persistent failure the
/// caller gets `EmbeddingFailure` and should proceed degraded.
pub async fn embed_with_retry<E: Embedder>(
    embedder: &E,
    query: &str,
) -> Result<(Vec<f32>, EmbeddingStats), PipelineError> {
    let mut last_err = None;
    for attempt in 0..MAX_EMBED_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(backoff_for_attempt(attempt)).await;
        }
        match embedder.embed(query).await {
            Ok(outcome) => {
                return Ok((
                    outcome.embedding,
                    EmbeddingStats {
                        tokens: outcome.usage.total_tokens,
                        cost: outcome.usage.cost,
                    },
                ))
            }
            Err(EmbeddingError::Request(e)) => last_err = Some(e.to_string()),
            Err(EmbeddingError::Api { status, body }) => {
                last_err = Some(format!("api error {status}: {body}"))
            }
            Err(EmbeddingError::EmptyResponse) => last_err = Some("empty response".to_string()),
            Err(EmbeddingError::Other(e)) => last_err = Some(e.to_string()),
        }
    }
    Err(PipelineError::EmbeddingFailure(
        last_err.unwrap_or_else(|| "unknown embedding error".to_string()),
    ))
}

/// run the vector retriever: embed then ANN-search. `num_candidates` is
/// widened to `max(top_k * 2, 100)` per spec §4.3 before the backend call.
pub async fn retrieve<B: SearchBackend, E: Embedder>(
    backend: &B,
    embedder: &E,
    query: &str,
    top_k: usize,
    filters: &Filters,
    timeout: Duration,
) -> Result<(Vec<Candidate>, EmbeddingStats), PipelineError> {
    let (vector, stats) = embed_with_retry(embedder, query).await?;
    let num_candidates = (top_k * 2).max(100);

    match tokio::time::timeout(
        timeout,
        backend.search_vector(&vector, filters, top_k, num_candidates),
    )
    .await
    {
        Ok(Ok(candidates)) => Ok((candidates, stats)),
        Ok(Err(BackendError::Timeout)) => Err(PipelineError::Timeout),
        Ok(Err(BackendError::Busy)) => Err(PipelineError::Busy),
        Ok(Err(BackendError::Unavailable(msg))) => Err(PipelineError::BackendUnavailable(msg)),
        Err(_elapsed) => Err(PipelineError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::model::{Item, Source};
    use crate::providers::EmbeddingOutcome;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn item(id: &str, embedding: Vec<f32>) -> Item {
        Item {
            id: id.to_string(),
            title: String::new(),
            module: String::new(),
            description: String::new(),
            steps: String::new(),
            expected_results: String::new(),
            pre_requisites: String::new(),
            priority: String::new(),
            risk: String::new(),
            key: String::new(),
            summary: String::new(),
            acceptance_criteria: String::new(),
            business_value: String::new(),
            embedding,
            metadata: Default::default(),
        }
    }

    struct FlakyEmbedder {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingOutcome, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(EmbeddingError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(EmbeddingOutcome {
                embedding: vec![1.0, 0.0],
                usage: Default::default(),
            })
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures_within_retry_budget() {
        let embedder = FlakyEmbedder {
            fail_times: 2,
            calls: AtomicU32::new(0),
        };
        let backend = InMemoryBackend::new(vec![item("1", vec![1.0, 0.0])]);
        let result = retrieve(&backend, &embedder, "q", 5, &Filters::new(), DEFAULT_TIMEOUT).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_embedding_failure_surfaces_as_embedding_failure() {
        let embedder = FlakyEmbedder {
            fail_times: 10,
            calls: AtomicU32::new(0),
        };
        let backend = InMemoryBackend::new(vec![item("1", vec![1.0, 0.0])]);
        let result = retrieve(&backend, &embedder, "q", 5, &Filters::new(), DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(PipelineError::EmbeddingFailure(_))));
    }

    #[tokio::test]
    async fn candidates_carry_vector_source_tag() {
        struct OkEmbedder;
        impl Embedder for OkEmbedder {
            async fn embed(&self, _text: &str) -> Result<EmbeddingOutcome, EmbeddingError> {
                Ok(EmbeddingOutcome {
                    embedding: vec![1.0, 0.0],
                    usage: Default::default(),
                })
            }
            fn name(&self) -> &'static str {
                "ok"
            }
        }
        let backend = InMemoryBackend::new(vec![item("1", vec![1.0, 0.0])]);
        let (results, _) = retrieve(&backend, &OkEmbedder, "q", 5, &Filters::new(), DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(results[0].source, Source::Vector);
    }
}
