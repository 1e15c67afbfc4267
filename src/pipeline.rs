//! pipeline orchestrator (C7): drives C1→C6, tracks per-stage timings,
//! costs, and token counts, emits progress checkpoints, and applies the
//! partial-failure policy from spec §7.
//!
//! lexical and vector retrieval run concurrently via `tokio::try_join!`
//! (the teacher's traits are already async-first; here two calls are
//! actually joined instead of issued one at a time) and the whole run is
//! bounded by a single end-to-end deadline, matching "in-flight remote
//! calls must be cancelled, not abandoned" — a dropped future is exactly
//! what `tokio::time::timeout` does on expiry.

use crate::backend::SearchBackend;
use crate::dedup;
use crate::error::PipelineError;
use crate::lexical;
use crate::model::{
    Candidate, Filters, FieldWeights, FusionPolicy, NormalizeOptions, QueryTransformation,
    RankedCandidate, RemovedCandidate, StageRecord, SummaryStyle,
};
use crate::normalize;
use crate::providers::{Completer, Embedder};
use crate::scoring::{self, FusionWeights};
use crate::summarize;
use crate::vector;
use std::time::{Duration, Instant};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: &'static str,
    pub percent: u8,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub filters: Filters,
    pub field_weights: FieldWeights,
    pub limit: usize,
    pub fusion_policy: FusionPolicy,
    pub fusion_weights: FusionWeights,
    pub dedup_threshold: f32,
    pub normalize_options: NormalizeOptions,
    pub include_summary: bool,
    pub summary_style: SummaryStyle,
    pub deadline: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            filters: Filters::new(),
            field_weights: lexical::default_field_weights(),
            limit: 10,
            fusion_policy: FusionPolicy::Weighted,
            fusion_weights: FusionWeights::default(),
            dedup_threshold: 0.95,
            normalize_options: NormalizeOptions::default(),
            include_summary: false,
            summary_style: SummaryStyle::Concise,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub transformation: QueryTransformation,
    pub candidates_lexical: Vec<Candidate>,
    pub candidates_vector: Vec<Candidate>,
    pub fused: Vec<RankedCandidate>,
    pub deduplicated: Vec<RankedCandidate>,
    pub removed: Vec<RemovedCandidate>,
    pub summary: Option<String>,
    pub warnings: Vec<String>,
    pub degraded: bool,
    pub stages: Vec<StageRecord>,
    pub total_cost: f64,
    pub total_tokens: u64,
}

struct StageTracker {
    started: Instant,
}

impl StageTracker {
    fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn finish(
        self,
        stage: &str,
        candidates_in: usize,
        candidates_out: usize,
        error: Option<String>,
    ) -> StageRecord {
        StageRecord {
            stage: stage.to_string(),
            wall_clock_ms: self.started.elapsed().as_millis() as u64,
            candidates_in,
            candidates_out,
            tokens: 0,
            cost: 0.0,
            error,
        }
    }
}

fn emit(progress: Option<&tokio::sync::mpsc::Sender<ProgressEvent>>, stage: &'static str, percent: u8) {
    if let Some(sender) = progress {
        let _ = sender.try_send(ProgressEvent { stage, percent });
    }
}

/// run the full end-to-end pipeline: validate → normalise → retrieve
/// (lexical ∥ vector) → fuse → deduplicate → (optional) summarise.
pub async fn run<B, E, C>(
    backend: &B,
    embedder: &E,
    completer: &C,
    query: &str,
    opts: RunOptions,
    progress: Option<tokio::sync::mpsc::Sender<ProgressEvent>>,
) -> Result<RunResult, PipelineError>
where
    B: SearchBackend,
    E: Embedder,
    C: Completer,
{
    let deadline = opts.deadline;
    tokio::time::timeout(
        deadline,
        run_inner(backend, embedder, completer, query, opts, progress),
    )
    .await
    .unwrap_or(Err(PipelineError::Timeout))
}

async fn run_inner<B, E, C>(
    backend: &B,
    embedder: &E,
    completer: &C,
    query: &str,
    opts: RunOptions,
    progress: Option<tokio::sync::mpsc::Sender<ProgressEvent>>,
) -> Result<RunResult, PipelineError>
where
    B: SearchBackend,
    E: Embedder,
    C: Completer,
{
    let mut stages = Vec::new();
    let mut warnings = Vec::new();
    let mut total_cost = 0.0;
    let mut total_tokens = 0u64;

    // stage: validate input (5%)
    let tracker = StageTracker::start();
    if query.trim().is_empty() {
        return Err(PipelineError::InvalidArgument("query must not be empty".to_string()));
    }
    stages.push(tracker.finish("validate", 0, 0, None));
    emit(progress.as_ref(), "validate", 5);

    // stage: normalise (10%)
    let tracker = StageTracker::start();
    let transformation = normalize::normalize(query, &opts.normalize_options);
    stages.push(tracker.finish("normalise", 0, transformation.expansions.len(), None));
    emit(progress.as_ref(), "normalise", 10);

    // stage: retrieve lexical ∥ vector (35%)
    let tracker = StageTracker::start();
    let normalised_query = transformation.normalised.clone();

    let lexical_fut = lexical::retrieve(
        backend,
        &normalised_query,
        opts.limit.max(1) * 3,
        &opts.filters,
        &opts.field_weights,
        lexical::DEFAULT_TIMEOUT,
    );
    let vector_fut = vector::retrieve(
        backend,
        embedder,
        &normalised_query,
        opts.limit.max(1) * 3,
        &opts.filters,
        vector::DEFAULT_TIMEOUT,
    );

    let (lexical_result, vector_result) = tokio::join!(lexical_fut, vector_fut);

    let candidates_lexical = lexical_result?;

    let mut degraded = false;
    let candidates_vector = match vector_result {
        Ok((candidates, stats)) => {
            total_cost += stats.cost;
            total_tokens += stats.tokens;
            candidates
        }
        Err(PipelineError::EmbeddingFailure(msg)) => {
            degraded = true;
            warnings.push(format!("EmbeddingFailure: {msg}; continuing lexical-only"));
            Vec::new()
        }
        Err(other) => return Err(other),
    };

    stages.push(tracker.finish(
        "retrieve",
        0,
        candidates_lexical.len() + candidates_vector.len(),
        None,
    ));
    emit(progress.as_ref(), "retrieve", 35);

    // stage: fuse (45%)
    let tracker = StageTracker::start();
    let fused = scoring::fuse(
        &candidates_lexical,
        &candidates_vector,
        opts.fusion_policy,
        opts.fusion_weights,
        opts.limit.max(1) * 3,
    )?;
    stages.push(tracker.finish(
        "fuse",
        candidates_lexical.len() + candidates_vector.len(),
        fused.len(),
        None,
    ));
    emit(progress.as_ref(), "fuse", 45);

    // stage: deduplicate (55%)
    let tracker = StageTracker::start();
    let fused_len = fused.len();
    let (mut deduplicated, removed) = dedup::deduplicate(fused.clone(), opts.dedup_threshold);
    deduplicated.truncate(opts.limit);
    stages.push(tracker.finish("deduplicate", fused_len, deduplicated.len(), None));
    emit(progress.as_ref(), "deduplicate", 55);

    // stage: summarise (75%), optional and never fatal
    let tracker = StageTracker::start();
    let mut summary = None;
    if opts.include_summary {
        let items: Vec<_> = deduplicated.iter().map(|c| c.item.clone()).collect();
        match summarize::summarize(completer, &items, opts.summary_style).await {
            Some(outcome) => {
                total_cost += outcome.usage.cost;
                total_tokens += outcome.usage.total_tokens;
                warnings.extend(outcome.warnings.clone());
                summary = Some(outcome.text);
            }
            None => {
                warnings.push("SummariserFailure: summariser unavailable after retry".to_string());
            }
        }
    }
    stages.push(tracker.finish(
        "summarise",
        deduplicated.len(),
        summary.is_some() as usize,
        None,
    ));
    emit(progress.as_ref(), "summarise", 75);
    emit(progress.as_ref(), "return", 100);

    Ok(RunResult {
        transformation,
        candidates_lexical,
        candidates_vector,
        fused,
        deduplicated,
        removed,
        summary,
        warnings,
        degraded,
        stages,
        total_cost,
        total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::model::Item;
    use crate::providers::{CompletionError, CompletionOutcome, EmbeddingError, EmbeddingOutcome};

    fn item(id: &str, title: &str, embedding: Vec<f32>) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
            module: "consent".to_string(),
            description: String::new(),
            steps: String::new(),
            expected_results: String::new(),
            pre_requisites: String::new(),
            priority: "P1".to_string(),
            risk: String::new(),
            key: String::new(),
            summary: String::new(),
            acceptance_criteria: String::new(),
            business_value: String::new(),
            embedding,
            metadata: Default::default(),
        }
    }

    struct StubEmbedder {
        fail: bool,
    }
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingOutcome, EmbeddingError> {
            if self.fail {
                Err(EmbeddingError::Api {
                    status: 503,
                    body: "down".to_string(),
                })
            } else {
                Ok(EmbeddingOutcome {
                    embedding: vec![1.0, 0.0],
                    usage: Default::default(),
                })
            }
        }
        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct StubCompleter;
    impl Completer for StubCompleter {
        async fn complete(&self, _prompt: &str) -> Result<CompletionOutcome, CompletionError> {
            Ok(CompletionOutcome {
                text: "digest".to_string(),
                usage: Default::default(),
                warnings: Vec::new(),
            })
        }
        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[tokio::test]
    async fn hybrid_search_finds_exact_title_match_at_rank_one() {
        let backend = InMemoryBackend::new(vec![
            item("1", "Patient Consent Verification - WhatsApp Communication", vec![0.9, 0.1]),
            item("2", "Appointment Reminder", vec![0.1, 0.9]),
            item("3", "Billing Export", vec![0.2, 0.8]),
        ]);
        let embedder = StubEmbedder { fail: false };
        let completer = StubCompleter;

        let result = run(
            &backend,
            &embedder,
            &completer,
            "patient consent whatsapp",
            RunOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.deduplicated[0].item.id, "1");
        assert!(!result.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn embedding_failure_degrades_to_lexical_only() {
        let backend = InMemoryBackend::new(vec![item("1", "Patient Consent Verification", vec![0.9, 0.1])]);
        let embedder = StubEmbedder { fail: true };
        let completer = StubCompleter;

        let result = run(
            &backend,
            &embedder,
            &completer,
            "patient consent",
            RunOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert!(result.degraded);
        assert!(result.candidates_vector.is_empty());
        assert!(!result.deduplicated.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let backend = InMemoryBackend::new(vec![]);
        let embedder = StubEmbedder { fail: false };
        let completer = StubCompleter;

        let result = run(&backend, &embedder, &completer, "   ", RunOptions::default(), None).await;
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn stage_checkpoints_are_monotonic_and_terminate_at_100() {
        let backend = InMemoryBackend::new(vec![item("1", "Patient Consent Verification", vec![0.9, 0.1])]);
        let embedder = StubEmbedder { fail: false };
        let completer = StubCompleter;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);

        run(
            &backend,
            &embedder,
            &completer,
            "patient consent",
            RunOptions::default(),
            Some(tx),
        )
        .await
        .unwrap();

        let mut last = 0u8;
        let mut saw_100 = false;
        while let Ok(event) = rx.try_recv() {
            assert!(event.percent >= last);
            last = event.percent;
            saw_100 = event.percent == 100;
        }
        assert!(saw_100);
    }
}
