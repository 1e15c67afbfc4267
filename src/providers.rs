//! provider abstractions for the two remote model services this pipeline
//! depends on: the embedding service (C3) and the completion service (C6).
//!
//! kept as traits so the HTTP-backed implementations in `embedding.rs` and
//! `summarize.rs` can be swapped for stubs in tests without touching the
//! retrieval or fusion logic, following the teacher's `Embedder`/
//! `VectorStore` trait design in `providers.rs`.

use std::future::Future;
use thiserror::Error;

/// errors that can occur when generating embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("no embedding returned from provider")]
    EmptyResponse,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// token/cost metadata returned alongside an embedding, per spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingUsage {
    pub total_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingOutcome {
    pub embedding: Vec<f32>,
    pub usage: EmbeddingUsage,
}

/// a provider that can generate a dense embedding for text.
pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<EmbeddingOutcome, EmbeddingError>> + Send;

    fn name(&self) -> &'static str;
}

/// errors that can occur when calling the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse completion response: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// token/cost metadata returned alongside a completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub text: String,
    pub usage: CompletionUsage,
    /// non-fatal issues noticed while parsing the response (e.g. a
    /// markdown-fenced payload that was truncated), surfaced to the
    /// caller as warnings rather than hard failures.
    pub warnings: Vec<String>,
}

/// a provider that can complete a chat-style prompt.
pub trait Completer: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<CompletionOutcome, CompletionError>> + Send;

    fn name(&self) -> &'static str;
}
