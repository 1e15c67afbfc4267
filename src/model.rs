//! shared data types that cross module and HTTP boundaries
//!
//! kept in one place (rather than duplicated per-module) because every
//! stage of the pipeline reads or produces these same shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// the stored unit. immutable from the pipeline's perspective; owned by
/// the search backend, borrowed by the pipeline for the life of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: String,
    #[serde(default)]
    pub expected_results: String,
    #[serde(default)]
    pub pre_requisites: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub risk: String,

    /// user-story-shaped projection, populated when the stored item came
    /// from that collection rather than a test-case collection (see
    /// spec's open question on dual item shapes).
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default)]
    pub business_value: String,

    /// dense embedding vector; length must equal the configured dimension.
    #[serde(default)]
    pub embedding: Vec<f32>,

    /// arbitrary opaque metadata, passed through to the caller untouched.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    /// the text used for title-based similarity in deduplication, falling
    /// back to full-document concatenation when the title is empty.
    pub fn dedup_text(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.summary.is_empty() {
            &self.summary
        } else {
            &self.description
        }
    }

    /// full-document concatenation fallback used when both title and the
    /// primary fallback are empty.
    pub fn full_document(&self) -> String {
        [
            &self.title,
            &self.summary,
            &self.description,
            &self.steps,
            &self.expected_results,
            &self.acceptance_criteria,
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// which retriever produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Lexical,
    Vector,
}

/// a transient record emitted by a retriever for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub item: Item,
    pub raw_score: f32,
    pub source: Source,
}

/// a candidate enriched during fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub item: Item,

    pub lexical_raw_score: Option<f32>,
    pub lexical_normalised_score: Option<f32>,
    pub lexical_rank: Option<usize>,

    pub vector_raw_score: Option<f32>,
    pub vector_normalised_score: Option<f32>,
    pub vector_rank: Option<usize>,

    pub fused_score: f32,
    pub sources_found_in: HashSet<Source>,

    /// `original_best_rank - new_rank`; positive means the item climbed.
    pub rank_change: i64,
}

impl RankedCandidate {
    /// the lower (better) of the two original ranks, used for the
    /// fusion tie-break chain. `None` if the item appeared in neither
    /// source, which cannot happen for a fused candidate in practice.
    pub fn best_original_rank(&self) -> usize {
        match (self.lexical_rank, self.vector_rank) {
            (Some(l), Some(v)) => l.min(v),
            (Some(l), None) => l,
            (None, Some(v)) => v,
            (None, None) => usize::MAX,
        }
    }
}

/// a near-duplicate removed from the fused list, carrying the id of the
/// first colliding kept item it matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedCandidate {
    pub item: Item,
    pub duplicate_of: String,
    pub similarity: f32,
}

/// options accepted by the query normaliser (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeOptions {
    #[serde(default = "default_true")]
    pub enable_abbreviations: bool,
    #[serde(default = "default_true")]
    pub enable_synonyms: bool,
    #[serde(default = "default_max_synonym_variations")]
    pub max_synonym_variations: usize,
    #[serde(default = "default_true")]
    pub preserve_identifiers: bool,
    #[serde(default)]
    pub custom_abbreviations: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub custom_synonyms: std::collections::HashMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_max_synonym_variations() -> usize {
    2
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            enable_abbreviations: true,
            enable_synonyms: true,
            max_synonym_variations: default_max_synonym_variations(),
            preserve_identifiers: true,
            custom_abbreviations: Default::default(),
            custom_synonyms: Default::default(),
        }
    }
}

/// output of the query normaliser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTransformation {
    pub original: String,
    pub normalised: String,
    /// ordered rewrites; index 0 is always the normalised original.
    pub expansions: Vec<String>,
    pub abbreviations_applied: Vec<String>,
    pub synonyms_applied: Vec<String>,
}

/// AND-composed equality predicates over `Item::metadata`. absent filters
/// (an empty map) are a no-op.
pub type Filters = std::collections::HashMap<String, serde_json::Value>;

/// per-field weights used by the lexical retriever's compound query.
pub type FieldWeights = std::collections::HashMap<String, f32>;

/// token/cost metadata surfaced by the embedding sub-step of C3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub tokens: u64,
    pub cost: f64,
}

/// the three fusion policies spec.md requires all be implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionPolicy {
    Rrf,
    Weighted,
    Reciprocal,
}

/// per-stage timing/cost/token bookkeeping, rolled up by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub wall_clock_ms: u64,
    pub candidates_in: usize,
    pub candidates_out: usize,
    pub tokens: u64,
    pub cost: f64,
    pub error: Option<String>,
}

/// summary style requested from the summariser (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    #[default]
    Concise,
    Detailed,
}

/// background job lifecycle tracked by the job registry (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub total: usize,
    pub progress: usize,
    pub results: Vec<serde_json::Value>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}
