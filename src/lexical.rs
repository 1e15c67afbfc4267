//! lexical retriever (C2): issues a weighted-field BM25-style query to the
//! search backend and returns ranked candidates with raw backend scores.
//!
//! generalises the teacher's `TurbopufferStore::search_by_keyword` (a
//! single-field BM25 `rank_by` request) into the multi-field weighted
//! contract spec §4.2 requires.

use crate::backend::{BackendError, SearchBackend};
use crate::error::PipelineError;
use crate::model::{Candidate, FieldWeights, Filters};
use std::time::Duration;

/// default per-field boosts from spec §4.2.
pub fn default_field_weights() -> FieldWeights {
    [
        ("id", 10.0),
        ("title", 8.0),
        ("module", 5.0),
        ("description", 2.0),
        ("expectedResults", 1.5),
        ("steps", 1.0),
        ("preRequisites", 0.8),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// run the lexical retriever against `backend`, at most `top_k` candidates,
/// ordered by lexical score descending. an empty result is not an error;
/// a backend failure becomes `BackendUnavailable`, a deadline breach
/// becomes `Timeout`.
pub async fn retrieve<B: SearchBackend>(
    backend: &B,
    query: &str,
    top_k: usize,
    filters: &Filters,
    field_weights: &FieldWeights,
    timeout: Duration,
) -> Result<Vec<Candidate>, PipelineError> {
    match tokio::time::timeout(
        timeout,
        backend.search_lexical(query, field_weights, filters, top_k),
    )
    .await
    {
        Ok(Ok(candidates)) => Ok(candidates),
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

    fn item(id: &str, title: &str) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
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
            embedding: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let backend = InMemoryBackend::new(vec![item("1", "Appointment Scheduling")]);
        let results = retrieve(
            &backend,
            "zzz_no_match_zzz",
            10,
            &Filters::new(),
            &default_field_weights(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn candidates_carry_lexical_source_tag() {
        let backend = InMemoryBackend::new(vec![item("1", "Patient Consent Verification")]);
        let results = retrieve(
            &backend,
            "patient consent",
            10,
            &Filters::new(),
            &default_field_weights(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(results[0].source, Source::Lexical);
    }
}
