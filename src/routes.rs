//! `/api/*` HTTP handlers (spec §6.1), thin over `pipeline.rs` for the
//! multi-stage endpoints and directly over a single C-component for the
//! single-stage ones (`preprocess`, `deduplicate`, `summarize`).
//!
//! request/response shapes follow the teacher's `SearchQuery`/`SearchResponse`
//! style in `search.rs`: a `#[derive(Deserialize)]` struct per endpoint with
//! `#[serde(default = "...")]` for optional fields, handlers returning
//! `actix_web::Result<HttpResponse>` so `PipelineError`'s `ResponseError`
//! impl maps failures to the right status automatically via `?`.

use crate::backend::{HttpSearchBackend, PooledBackend, SearchBackend};
use crate::dedup;
use crate::error::PipelineError;
use crate::jobs::JobRegistry;
use crate::lexical;
use crate::model::{
    Filters, FusionPolicy, Item, NormalizeOptions, RankedCandidate, Source, SummaryStyle,
};
use crate::normalize;
use crate::pipeline;
use crate::embedding::HttpEmbedder;
use crate::providers::Completer;
use crate::summarize::HttpCompleter;
use crate::scoring::FusionWeights;
use crate::summarize;
use crate::vector;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// shared application state, one instance per worker via `web::Data`.
///
/// concrete (not generic) over the production backend/embedder/completer:
/// actix's route registration needs a single monomorphic handler per path,
/// and the trait abstractions below exist for testability, not for
/// runtime backend swapping (the teacher does the same with a concrete
/// `Config`/`TurbopufferStore`, no `dyn`).
pub struct AppState {
    pub backend: PooledBackend<HttpSearchBackend>,
    pub embedder: HttpEmbedder,
    pub completer: HttpCompleter,
    pub jobs: JobRegistry,
    /// orchestrator's own dedup threshold (config §6.3, stricter than the
    /// deduplicator's standalone default used by `default_dedup_threshold`).
    pub dedup_threshold_default: f32,
}

fn default_limit() -> usize {
    10
}

fn default_rerank_top_k() -> usize {
    50
}

fn default_bm25_weight() -> f32 {
    0.4
}

fn default_vector_weight() -> f32 {
    0.6
}

fn default_dedup_threshold() -> f32 {
    dedup::DEFAULT_THRESHOLD
}

fn field_weights_for(fields: &Option<Vec<String>>) -> crate::model::FieldWeights {
    let defaults = lexical::default_field_weights();
    match fields {
        None => defaults,
        Some(names) => defaults
            .into_iter()
            .filter(|(field, _)| names.contains(field))
            .collect(),
    }
}

fn candidate_json(candidate: &RankedCandidate) -> serde_json::Value {
    serde_json::json!({
        "item": candidate.item,
        "score": candidate.fused_score,
        "lexicalScore": candidate.lexical_normalised_score,
        "vectorScore": candidate.vector_normalised_score,
        "rankChange": candidate.rank_change,
    })
}

// ---------------------------------------------------------------------
// POST /api/search — pure vector path
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Filters,
}

pub async fn search(
    body: web::Json<SearchRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let transformation = normalize::normalize(&body.query, &NormalizeOptions::default());
    let (candidates, stats) = vector::retrieve(
        &state.backend,
        &state.embedder,
        &transformation.normalised,
        body.limit,
        &body.filters,
        vector::DEFAULT_TIMEOUT,
    )
    .await?;

    let results: Vec<_> = candidates
        .into_iter()
        .take(body.limit)
        .map(|c| serde_json::json!({"item": c.item, "score": c.raw_score}))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "query": body.query,
        "filters": body.filters,
        "results": results,
        "cost": stats.cost,
        "tokens": stats.tokens,
    })))
}

// ---------------------------------------------------------------------
// POST /api/search/bm25
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25Request {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

pub async fn search_bm25(
    body: web::Json<Bm25Request>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let started = Instant::now();
    let transformation = normalize::normalize(&body.query, &NormalizeOptions::default());
    let weights = field_weights_for(&body.fields);

    let candidates = lexical::retrieve(
        &state.backend,
        &transformation.normalised,
        body.limit,
        &body.filters,
        &weights,
        lexical::DEFAULT_TIMEOUT,
    )
    .await?;

    let count = candidates.len();
    let results: Vec<_> = candidates
        .into_iter()
        .take(body.limit)
        .map(|c| serde_json::json!({"item": c.item, "score": c.raw_score}))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "searchType": "bm25",
        "results": results,
        "count": count,
        "searchTime": started.elapsed().as_millis(),
    })))
}

// ---------------------------------------------------------------------
// POST /api/search/hybrid
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default)]
    pub bm25_fields: Option<Vec<String>>,
}

pub async fn search_hybrid(
    body: web::Json<HybridRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let started = Instant::now();
    let opts = pipeline::RunOptions {
        filters: body.filters.clone(),
        field_weights: field_weights_for(&body.bm25_fields),
        limit: body.limit,
        fusion_policy: FusionPolicy::Weighted,
        fusion_weights: FusionWeights {
            lexical: body.bm25_weight,
            vector: body.vector_weight,
        },
        dedup_threshold: state.dedup_threshold_default,
        include_summary: false,
        ..pipeline::RunOptions::default()
    };

    let result = pipeline::run(&state.backend, &state.embedder, &state.completer, &body.query, opts, None).await?;
    let results: Vec<_> = result.deduplicated.iter().map(candidate_json).collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "searchType": "hybrid",
        "results": results,
        "degraded": result.degraded,
        "stats": {
            "lexicalCandidates": result.candidates_lexical.len(),
            "vectorCandidates": result.candidates_vector.len(),
            "fused": result.fused.len(),
            "deduplicated": result.removed.len(),
        },
        "timing": {"totalMs": started.elapsed().as_millis()},
        "cost": result.total_cost,
        "tokens": result.total_tokens,
    })))
}

// ---------------------------------------------------------------------
// POST /api/search/rerank
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Filters,
    pub fusion_method: FusionPolicy,
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
}

pub async fn search_rerank(
    body: web::Json<RerankRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let started = Instant::now();
    let opts = pipeline::RunOptions {
        filters: body.filters.clone(),
        field_weights: lexical::default_field_weights(),
        limit: body.rerank_top_k,
        fusion_policy: body.fusion_method,
        fusion_weights: FusionWeights {
            lexical: body.bm25_weight,
            vector: body.vector_weight,
        },
        dedup_threshold: state.dedup_threshold_default,
        include_summary: false,
        ..pipeline::RunOptions::default()
    };

    let result = pipeline::run(&state.backend, &state.embedder, &state.completer, &body.query, opts, None).await?;

    let before: Vec<_> = result
        .candidates_lexical
        .iter()
        .take(body.limit)
        .map(|c| serde_json::json!({"item": c.item, "score": c.raw_score}))
        .collect();
    let after: Vec<_> = result
        .deduplicated
        .iter()
        .take(body.limit)
        .map(candidate_json)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "fusionMethod": body.fusion_method,
        "results": after.clone(),
        "beforeReranking": before,
        "afterReranking": after,
        "degraded": result.degraded,
        "stats": {
            "lexicalCandidates": result.candidates_lexical.len(),
            "vectorCandidates": result.candidates_vector.len(),
        },
        "timing": {"totalMs": started.elapsed().as_millis()},
        "cost": result.total_cost,
        "tokens": result.total_tokens,
    })))
}

// ---------------------------------------------------------------------
// POST /api/search/preprocess
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PreprocessRequest {
    pub query: String,
    #[serde(default)]
    pub options: NormalizeOptions,
}

pub async fn preprocess(body: web::Json<PreprocessRequest>) -> ActixResult<HttpResponse> {
    let transformation = normalize::normalize(&body.query, &body.options);
    Ok(HttpResponse::Ok().json(transformation))
}

// ---------------------------------------------------------------------
// POST /api/search/deduplicate
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeduplicateRequest {
    pub results: Vec<Item>,
    #[serde(default = "default_dedup_threshold")]
    pub threshold: f32,
}

fn as_ranked(items: Vec<Item>) -> Vec<RankedCandidate> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| RankedCandidate {
            item,
            lexical_raw_score: None,
            lexical_normalised_score: None,
            lexical_rank: Some(i + 1),
            vector_raw_score: None,
            vector_normalised_score: None,
            vector_rank: None,
            fused_score: 0.0,
            sources_found_in: [Source::Lexical].into_iter().collect(),
            rank_change: 0,
        })
        .collect()
}

pub async fn deduplicate(body: web::Json<DeduplicateRequest>) -> ActixResult<HttpResponse> {
    let ranked = as_ranked(body.results.clone());
    let input_count = ranked.len();
    let (kept, removed) = dedup::deduplicate(ranked, body.threshold);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "deduplicated": kept.iter().map(|c| &c.item).collect::<Vec<_>>(),
        "duplicates": removed,
        "stats": {
            "input": input_count,
            "kept": kept.len(),
            "removed": removed.len(),
        },
    })))
}

// ---------------------------------------------------------------------
// POST /api/search/summarize
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub results: Vec<Item>,
    #[serde(default)]
    pub summary_type: SummaryStyle,
}

pub async fn search_summarize(
    body: web::Json<SummarizeRequest>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    match summarize::summarize(&state.completer, &body.results, body.summary_type).await {
        Some(outcome) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "summary": outcome.text,
            "tokens": outcome.usage.total_tokens,
            "cost": outcome.usage.cost,
            "model": state.completer.name(),
            "warnings": outcome.warnings,
        }))),
        None => Ok(HttpResponse::Ok().json(serde_json::json!({
            "summary": serde_json::Value::Null,
            "tokens": 0,
            "cost": 0.0,
            "model": state.completer.name(),
            "warnings": ["SummariserFailure: summariser unavailable after retry"],
        }))),
    }
}

// ---------------------------------------------------------------------
// GET /api/metadata/distinct
// ---------------------------------------------------------------------

pub async fn metadata_distinct(
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (modules, priorities, risks, types) = tokio::try_join!(
        state.backend.distinct("module"),
        state.backend.distinct("priority"),
        state.backend.distinct("risk"),
        state.backend.distinct("type"),
    )
    .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "modules": modules,
        "priorities": priorities,
        "risks": risks,
        "types": types,
    })))
}

// ---------------------------------------------------------------------
// GET /api/jobs/:id, GET /api/jobs/active
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct JobsResponse {
    jobs: Vec<crate::model::Job>,
}

pub async fn job_by_id(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    match state.jobs.get(&id) {
        Some(job) => Ok(HttpResponse::Ok().json(job)),
        None => Err(PipelineError::NotFound(format!("job {id} not found")).into()),
    }
}

pub async fn jobs_active(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(JobsResponse {
        jobs: state.jobs.list_active(),
    }))
}
