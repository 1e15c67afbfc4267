use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup from the environment.
///
/// Missing critical values (backend connection, embedding/completion base
/// URLs, auth token) fail startup rather than falling back to a default.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Search backend connection string (lexical + vector index host).
    pub backend_uri: String,
    pub database_name: String,
    pub collection_name: String,
    pub text_index_name: String,
    pub vector_index_name: String,

    /// Remote embedding service, called as `POST {base}/embedding/text/{user_id}`.
    pub embedding_base_url: String,
    /// Remote completion service, called as `POST {base}/v1/chat/completions`.
    pub completion_base_url: String,

    pub user_id: String,
    pub auth_token: String,

    /// Embedding vector dimension (Item.embedding length).
    pub embedding_dim: usize,

    /// Bounded connection pool size to the search backend.
    pub backend_pool_size: usize,
    /// Wait budget before a saturated pool returns `Busy`.
    pub backend_pool_wait: Duration,

    /// Default deduplication threshold used by the orchestrator (stricter
    /// than the deduplicator's own standalone default of 0.85).
    pub dedup_threshold_default: f32,

    /// Default TTL for job registry eviction.
    pub job_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("failed to parse PORT")?,

            backend_uri: env::var("BACKEND_URI").context("BACKEND_URI must be set")?,
            database_name: env::var("DATABASE_NAME").context("DATABASE_NAME must be set")?,
            collection_name: env::var("COLLECTION_NAME").context("COLLECTION_NAME must be set")?,
            text_index_name: env::var("TEXT_INDEX_NAME")
                .unwrap_or_else(|_| "text_search_index".to_string()),
            vector_index_name: env::var("VECTOR_INDEX_NAME")
                .unwrap_or_else(|_| "vector_search_index".to_string()),

            embedding_base_url: env::var("EMBEDDING_SERVICE_BASE_URL")
                .context("EMBEDDING_SERVICE_BASE_URL must be set")?,
            completion_base_url: env::var("COMPLETION_SERVICE_BASE_URL")
                .context("COMPLETION_SERVICE_BASE_URL must be set")?,

            user_id: env::var("SERVICE_USER_ID").context("SERVICE_USER_ID must be set")?,
            auth_token: env::var("SERVICE_AUTH_TOKEN").context("SERVICE_AUTH_TOKEN must be set")?,

            embedding_dim: env::var("EMBEDDING_DIM")
                .unwrap_or_else(|_| "1536".to_string())
                .parse()
                .context("failed to parse EMBEDDING_DIM")?,

            backend_pool_size: env::var("BACKEND_POOL_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("failed to parse BACKEND_POOL_SIZE")?,
            backend_pool_wait: Duration::from_millis(
                env::var("BACKEND_POOL_WAIT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .context("failed to parse BACKEND_POOL_WAIT_MS")?,
            ),

            dedup_threshold_default: env::var("DEDUP_THRESHOLD_DEFAULT")
                .unwrap_or_else(|_| "0.95".to_string())
                .parse()
                .context("failed to parse DEDUP_THRESHOLD_DEFAULT")?,

            job_ttl: Duration::from_secs(
                env::var("JOB_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .context("failed to parse JOB_TTL_SECS")?,
            ),
        })
    }
}
