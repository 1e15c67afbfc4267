//! embedding service client
//!
//! implements the `Embedder` trait against the remote embedding endpoint
//! described in spec §6.2: `POST {base}/embedding/text/{userId}`.
//!
//! generalised from the teacher's `VoyageEmbedder` (one POST, bearer auth,
//! JSON body/response) to this service's envelope, which additionally
//! reports token usage and cost per call (§4.3).

use crate::providers::{Embedder, EmbeddingError, EmbeddingOutcome, EmbeddingUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[allow(dead_code)]
    status: Option<String>,
    data: Vec<EmbeddingData>,
    usage: Option<UsageBlock>,
    cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    total_tokens: u64,
}

/// HTTP client for the remote embedding service.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    user_id: String,
    auth_token: String,
}

impl HttpEmbedder {
    pub fn new(base_url: String, user_id: String, auth_token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            user_id,
            auth_token,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embedding/text/{}", self.base_url, self.user_id)
    }
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingOutcome, EmbeddingError> {
        let request = EmbeddingRequest {
            input: text,
            model: EMBEDDING_MODEL,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api { status, body });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Other(anyhow::anyhow!("failed to parse response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::EmptyResponse)?;

        Ok(EmbeddingOutcome {
            embedding,
            usage: EmbeddingUsage {
                total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
                cost: parsed.cost.unwrap_or(0.0),
            },
        })
    }

    fn name(&self) -> &'static str {
        "http-embedder"
    }
}
