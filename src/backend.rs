//! the search backend abstraction: the two index primitives spec §9
//! describes as "only their interface is specified" — a weighted-field
//! lexical (BM25-style) index and a cosine-similarity ANN vector index,
//! both combinable with equality filters.
//!
//! generalises the teacher's `VectorStore` trait (`search_by_vector`,
//! `search_by_keyword`) to the field-weighted, filtered contract spec's
//! C2/C3 require, and ships an in-memory reference implementation so the
//! pipeline can be exercised without a real backend in tests.

use crate::model::{Candidate, FieldWeights, Filters, Item, Source};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
    #[error("search backend timed out")]
    Timeout,
    #[error("connection pool saturated")]
    Busy,
}

/// one edit (insertion, deletion, substitution) of Levenshtein distance,
/// used by the lexical index's fuzzy matching.
#[cfg(test)]
fn levenshtein_at_most_one(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (la, lb) = (a.len(), b.len());
    if la.abs_diff(lb) > 1 {
        return false;
    }
    // substitution case: same length, at most one differing char
    if la == lb {
        return a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() <= 1;
    }
    // insertion/deletion case: shorter is a prefix-aligned subsequence of longer
    let (shorter, longer) = if la < lb { (&a, &b) } else { (&b, &a) };
    let mut si = 0;
    let mut skipped = false;
    for &lc in longer {
        if si < shorter.len() && shorter[si] == lc {
            si += 1;
        } else if !skipped {
            skipped = true;
        } else {
            return false;
        }
    }
    true
}

#[cfg(test)]
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
fn field_text<'a>(item: &'a Item, field: &str) -> &'a str {
    match field {
        "id" => &item.id,
        "title" => &item.title,
        "module" => &item.module,
        "description" => &item.description,
        "expectedResults" => &item.expected_results,
        "steps" => &item.steps,
        "preRequisites" => &item.pre_requisites,
        "key" => &item.key,
        "summary" => &item.summary,
        "acceptanceCriteria" => &item.acceptance_criteria,
        "priority" => &item.priority,
        "risk" => &item.risk,
        "type" => item.metadata.get("type").and_then(|v| v.as_str()).unwrap_or(""),
        _ => "",
    }
}

/// does `token` match any token of `field_tokens` under the backend's
/// single-edit fuzziness with a locked two-character prefix?
#[cfg(test)]
fn token_matches(token: &str, field_tokens: &[String]) -> bool {
    field_tokens.iter().any(|ft| {
        if token.len() < 2 || ft.len() < 2 {
            return token == ft;
        }
        // two-character prefix is locked: no fuzziness across it
        if token[..2] != ft[..2] {
            return false;
        }
        levenshtein_at_most_one(token, ft)
    })
}

#[cfg(test)]
fn passes_filters(item: &Item, filters: &Filters) -> bool {
    filters.iter().all(|(field, expected)| {
        item.metadata
            .get(field)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

#[cfg(test)]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// the two primitives the opaque search backend exposes.
pub trait SearchBackend: Send + Sync {
    fn search_lexical(
        &self,
        query: &str,
        field_weights: &FieldWeights,
        filters: &Filters,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<Candidate>, BackendError>> + Send;

    fn search_vector(
        &self,
        vector: &[f32],
        filters: &Filters,
        top_k: usize,
        num_candidates: usize,
    ) -> impl Future<Output = Result<Vec<Candidate>, BackendError>> + Send;

    fn distinct(
        &self,
        field: &str,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;
}

/// an in-memory reference backend. used by integration tests and as a
/// drop-in local mode; a production deployment swaps this for a real
/// search-engine client without touching `lexical.rs`/`vector.rs`.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    items: std::sync::Arc<Vec<Item>>,
}

#[cfg(test)]
impl InMemoryBackend {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: std::sync::Arc::new(items),
        }
    }
}

#[cfg(test)]
impl SearchBackend for InMemoryBackend {
    async fn search_lexical(
        &self,
        query: &str,
        field_weights: &FieldWeights,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Item)> = self
            .items
            .iter()
            .filter(|item| passes_filters(item, filters))
            .filter_map(|item| {
                let mut score = 0.0f32;
                for (field, weight) in field_weights {
                    let field_tokens = tokenize(field_text(item, field));
                    if field_tokens.is_empty() {
                        continue;
                    }
                    let matches = query_tokens
                        .iter()
                        .filter(|qt| token_matches(qt, &field_tokens))
                        .count();
                    if matches > 0 {
                        // crude TF boost within the field, scaled by its weight
                        score += weight * (matches as f32) / (field_tokens.len() as f32).sqrt();
                    }
                }
                (score > 0.0).then_some((score, item))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, item)| Candidate {
                item: item.clone(),
                raw_score: score,
                source: Source::Lexical,
            })
            .collect())
    }

    async fn search_vector(
        &self,
        vector: &[f32],
        filters: &Filters,
        top_k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let mut scored: Vec<(f32, &Item)> = self
            .items
            .iter()
            .filter(|item| passes_filters(item, filters))
            .map(|item| (cosine_similarity(vector, &item.embedding), item))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(num_candidates.max(top_k).min(scored.len()));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, item)| Candidate {
                item: item.clone(),
                // cosine similarity in [-1, 1], clamp to the [0, 1] the
                // spec promises by treating negative similarity as 0.
                raw_score: score.max(0.0),
                source: Source::Vector,
            })
            .collect())
    }

    async fn distinct(&self, field: &str) -> Result<Vec<String>, BackendError> {
        let mut values: Vec<String> = self
            .items
            .iter()
            .map(|item| field_text(item, field).to_string())
            .filter(|v| !v.is_empty())
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }
}

/// raw row returned by the backend's query endpoint, grounded on the
/// teacher's `QueryRow` (turbopuffer's `{id, dist, attributes}` shape):
/// an opaque id, a relevance score, and a bag of stored fields.
#[derive(Debug, Deserialize)]
struct QueryRow {
    id: String,
    score: f32,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

impl QueryRow {
    fn into_item(self) -> Result<Item, BackendError> {
        let mut fields = self.attributes;
        fields.insert("id".to_string(), serde_json::Value::String(self.id));
        serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| BackendError::Unavailable(format!("malformed document: {e}")))
    }
}

/// production search backend client, grounded on the teacher's
/// `TurbopufferStore`: same `{rank_by: [field, method, arg]}` query shape
/// and bearer-token auth, generalised to accept field weights and
/// equality filters in the request body.
#[derive(Clone)]
pub struct HttpSearchBackend {
    client: Client,
    base_uri: String,
    database_name: String,
    collection_name: String,
    text_index_name: String,
    vector_index_name: String,
    auth_token: String,
}

impl HttpSearchBackend {
    pub fn new(
        base_uri: String,
        database_name: String,
        collection_name: String,
        text_index_name: String,
        vector_index_name: String,
        auth_token: String,
    ) -> Self {
        Self {
            client: Client::new(),
            base_uri,
            database_name,
            collection_name,
            text_index_name,
            vector_index_name,
            auth_token,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}/{}", self.base_uri, self.database_name, self.collection_name)
    }

    async fn execute_query(&self, body: serde_json::Value) -> Result<Vec<QueryRow>, BackendError> {
        let response = self
            .client
            .post(format!("{}/query", self.collection_url()))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!("backend returned {status}: {body}")));
        }

        response
            .json::<Vec<QueryRow>>()
            .await
            .map_err(|e| BackendError::Unavailable(format!("malformed response: {e}")))
    }
}

impl SearchBackend for HttpSearchBackend {
    async fn search_lexical(
        &self,
        query: &str,
        field_weights: &FieldWeights,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let body = serde_json::json!({
            "rank_by": [self.text_index_name, "BM25", query],
            "field_weights": field_weights,
            "filters": filters,
            "top_k": top_k,
        });
        self.execute_query(body)
            .await?
            .into_iter()
            .map(|row| {
                let score = row.score;
                row.into_item().map(|item| Candidate {
                    item,
                    raw_score: score,
                    source: Source::Lexical,
                })
            })
            .collect()
    }

    async fn search_vector(
        &self,
        vector: &[f32],
        filters: &Filters,
        top_k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let body = serde_json::json!({
            "rank_by": [self.vector_index_name, "ANN", vector],
            "filters": filters,
            "top_k": top_k,
            "num_candidates": num_candidates,
        });
        self.execute_query(body)
            .await?
            .into_iter()
            .map(|row| {
                let score = row.score;
                row.into_item().map(|item| Candidate {
                    item,
                    raw_score: score,
                    source: Source::Vector,
                })
            })
            .collect()
    }

    async fn distinct(&self, field: &str) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .post(format!("{}/distinct", self.collection_url()))
            .bearer_auth(&self.auth_token)
            .json(&serde_json::json!({ "field": field }))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(BackendError::Unavailable(format!("backend returned {status}")));
        }

        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| BackendError::Unavailable(format!("malformed response: {e}")))
    }
}

/// bounds concurrent access to an inner backend through a fixed-size
/// connection pool (spec §5: "one connection pool to the search backend,
/// bounded, default 20"). acquiring a permit past `wait` surfaces `Busy`
/// rather than queuing, matching the "orchestrator does not queue" policy.
pub struct PooledBackend<B> {
    inner: B,
    semaphore: std::sync::Arc<tokio::sync::Semaphore>,
    wait: std::time::Duration,
}

impl<B> PooledBackend<B> {
    pub fn new(inner: B, pool_size: usize, wait: std::time::Duration) -> Self {
        Self {
            inner,
            semaphore: std::sync::Arc::new(tokio::sync::Semaphore::new(pool_size.max(1))),
            wait,
        }
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, BackendError> {
        match tokio::time::timeout(self.wait, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(BackendError::Unavailable("pool closed".to_string())),
            Err(_) => Err(BackendError::Busy),
        }
    }
}

impl<B: SearchBackend> SearchBackend for PooledBackend<B> {
    async fn search_lexical(
        &self,
        query: &str,
        field_weights: &FieldWeights,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let _permit = self.acquire().await?;
        self.inner.search_lexical(query, field_weights, filters, top_k).await
    }

    async fn search_vector(
        &self,
        vector: &[f32],
        filters: &Filters,
        top_k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let _permit = self.acquire().await?;
        self.inner.search_vector(vector, filters, top_k, num_candidates).await
    }

    async fn distinct(&self, field: &str) -> Result<Vec<String>, BackendError> {
        let _permit = self.acquire().await?;
        self.inner.distinct(field).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
            ..blank()
        }
    }

    fn blank() -> Item {
        Item {
            id: String::new(),
            module: String::new(),
            title: String::new(),
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
            embedding: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn lexical_search_ranks_exact_title_match_first() {
        let backend = InMemoryBackend::new(vec![
            item("1", "Patient Consent Verification - WhatsApp Communication"),
            item("2", "Appointment Reminder via SMS"),
            item("3", "Billing Statement Export"),
        ]);

        let mut weights = FieldWeights::new();
        weights.insert("title".to_string(), 8.0);
        weights.insert("description".to_string(), 2.0);

        let results = backend
            .search_lexical("patient consent whatsapp", &weights, &Filters::new(), 10)
            .await
            .unwrap();

        assert_eq!(results[0].item.id, "1");
    }

    #[test]
    fn fuzziness_allows_single_edit_beyond_locked_prefix() {
        assert!(levenshtein_at_most_one("patient", "patients"));
        assert!(levenshtein_at_most_one("patient", "patient"));
        assert!(!levenshtein_at_most_one("patient", "patently"));
    }
}
