//! score fusion (C4): normalisation and the three rank-fusion policies.
//!
//! generalises the teacher's single-policy `fuse_scores`/`FusionConfig`
//! (hard-coded `score = α·semantic + (1-α)·keyword`) into an
//! enum-dispatched fuser implementing all three policies spec §4.4
//! requires, with the deterministic tie-break chain grounded on
//! `other_examples`' RRF fusion module (`rrf_score` desc → original
//! rank asc → id lexicographic).

use crate::error::PipelineError;
use crate::model::{Candidate, FusionPolicy, RankedCandidate, Source};
use std::collections::HashMap;

const RRF_K: f64 = 60.0;

/// weights for the weighted fusion policies. the implementer renormalises
/// non-summing weights rather than rejecting them, per spec §4.4.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            vector: 0.6,
        }
    }
}

impl FusionWeights {
    fn normalised(&self) -> Result<(f32, f32), PipelineError> {
        let sum = self.lexical + self.vector;
        if sum <= 0.0 || !sum.is_finite() {
            return Err(PipelineError::InvalidArgument(
                "fusion weights must be positive and finite".to_string(),
            ));
        }
        Ok((self.lexical / sum, self.vector / sum))
    }
}

/// min-max normalise a list of (id, raw_score) pairs to [0, 1]. when
/// max == min every entry receives 1.0 (including the single-element case).
fn min_max_normalise(raw: &[(String, f32)]) -> HashMap<String, f32> {
    if raw.is_empty() {
        return HashMap::new();
    }
    let min = raw.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = raw.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    raw.iter()
        .map(|(id, score)| {
            let normalised = if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (score - min) / (max - min)
            };
            (id.clone(), normalised)
        })
        .collect()
}

/// 1-based ranks in descending-score order, ties broken by id so the
/// ranking itself is deterministic before fusion even runs.
fn ranks_of(raw: &[(String, f32)]) -> HashMap<String, usize> {
    let mut sorted: Vec<&(String, f32)> = raw.iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id.clone(), i + 1))
        .collect()
}

fn rrf_contribution(rank: Option<usize>) -> f64 {
    rank.map(|r| 1.0 / (RRF_K + r as f64)).unwrap_or(0.0)
}

fn reciprocal_contribution(rank: Option<usize>) -> f32 {
    rank.map(|r| 1.0 / r as f32).unwrap_or(0.0)
}

/// fuse the lexical and vector candidate lists under the given policy.
/// never produces more entries than `lexical.len() + vector.len()`,
/// truncated to `limit`.
pub fn fuse(
    lexical: &[Candidate],
    vector: &[Candidate],
    policy: FusionPolicy,
    weights: FusionWeights,
    limit: usize,
) -> Result<Vec<RankedCandidate>, PipelineError> {
    // RRF never consults `weights` (spec §4.4: rank positions and `k=60`
    // only), so an invalid weight pair must not reject an RRF request.
    let (w_lex, w_vec) = match policy {
        FusionPolicy::Rrf => (0.0, 0.0),
        FusionPolicy::Weighted | FusionPolicy::Reciprocal => weights.normalised()?,
    };

    let lex_raw: Vec<(String, f32)> = lexical.iter().map(|c| (c.item.id.clone(), c.raw_score)).collect();
    let vec_raw: Vec<(String, f32)> = vector.iter().map(|c| (c.item.id.clone(), c.raw_score)).collect();

    let lex_norm = min_max_normalise(&lex_raw);
    let vec_norm = min_max_normalise(&vec_raw);
    let lex_ranks = ranks_of(&lex_raw);
    let vec_ranks = ranks_of(&vec_raw);

    let mut items: HashMap<String, &Candidate> = HashMap::new();
    for c in lexical.iter().chain(vector.iter()) {
        items.entry(c.item.id.clone()).or_insert(c);
    }

    let mut fused: Vec<RankedCandidate> = items
        .into_iter()
        .map(|(id, candidate)| {
            let lexical_rank = lex_ranks.get(&id).copied();
            let vector_rank = vec_ranks.get(&id).copied();
            let lexical_normalised_score = lex_norm.get(&id).copied();
            let vector_normalised_score = vec_norm.get(&id).copied();

            let fused_score = match policy {
                FusionPolicy::Rrf => {
                    (rrf_contribution(lexical_rank) + rrf_contribution(vector_rank)) as f32
                }
                FusionPolicy::Weighted => {
                    w_lex * lexical_normalised_score.unwrap_or(0.0)
                        + w_vec * vector_normalised_score.unwrap_or(0.0)
                }
                FusionPolicy::Reciprocal => {
                    w_lex * reciprocal_contribution(lexical_rank)
                        + w_vec * reciprocal_contribution(vector_rank)
                }
            };

            let mut sources_found_in = std::collections::HashSet::new();
            if lexical_rank.is_some() {
                sources_found_in.insert(Source::Lexical);
            }
            if vector_rank.is_some() {
                sources_found_in.insert(Source::Vector);
            }

            let lexical_raw_score = lex_raw.iter().find(|(i, _)| i == &id).map(|(_, s)| *s);
            let vector_raw_score = vec_raw.iter().find(|(i, _)| i == &id).map(|(_, s)| *s);

            RankedCandidate {
                item: candidate.item.clone(),
                lexical_raw_score,
                lexical_normalised_score,
                lexical_rank,
                vector_raw_score,
                vector_normalised_score,
                vector_rank,
                fused_score,
                sources_found_in,
                rank_change: 0,
            }
        })
        .collect();

    // deterministic ordering: fused score desc, then lower original rank,
    // then id lexicographic.
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best_original_rank().cmp(&b.best_original_rank()))
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    for (new_rank, candidate) in fused.iter_mut().enumerate() {
        let original_best = candidate.best_original_rank();
        candidate.rank_change = if original_best == usize::MAX {
            0
        } else {
            original_best as i64 - (new_rank as i64 + 1)
        };
    }

    fused.truncate(limit);
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    fn candidate(id: &str, score: f32, source: Source) -> Candidate {
        Candidate {
            item: Item {
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
                embedding: Vec::new(),
                metadata: Default::default(),
            },
            raw_score: score,
            source,
        }
    }

    fn lex(id: &str, score: f32) -> Candidate {
        candidate(id, score, Source::Lexical)
    }
    fn vec_(id: &str, score: f32) -> Candidate {
        candidate(id, score, Source::Vector)
    }

    #[test]
    fn fused_length_never_exceeds_sum_of_inputs() {
        let l = vec![lex("a", 1.0), lex("b", 0.5)];
        let v = vec![vec_("b", 0.9), vec_("c", 0.2)];
        let fused = fuse(&l, &v, FusionPolicy::Rrf, FusionWeights::default(), 100).unwrap();
        assert!(fused.len() <= l.len() + v.len());
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn rrf_is_symmetric_under_swapping_inputs() {
        let l = vec![lex("a", 3.0), lex("b", 2.0), lex("c", 1.0)];
        let v = vec![vec_("b", 0.9), vec_("a", 0.4)];

        let forward = fuse(&l, &v, FusionPolicy::Rrf, FusionWeights::default(), 100).unwrap();
        let swapped = fuse(&v, &l, FusionPolicy::Rrf, FusionWeights::default(), 100).unwrap();

        let forward_order: Vec<&str> = forward.iter().map(|c| c.item.id.as_str()).collect();
        let swapped_order: Vec<&str> = swapped.iter().map(|c| c.item.id.as_str()).collect();
        assert_eq!(forward_order, swapped_order);
    }

    #[test]
    fn weighted_normalised_with_pure_lexical_weight_matches_lexical_order() {
        let l = vec![lex("a", 5.0), lex("b", 3.0), lex("c", 1.0)];
        let v = vec![vec_("a", 0.1), vec_("b", 0.99), vec_("c", 0.5)];

        let fused = fuse(
            &l,
            &v,
            FusionPolicy::Weighted,
            FusionWeights {
                lexical: 1.0,
                vector: 0.0,
            },
            100,
        )
        .unwrap();

        let order: Vec<&str> = fused.iter().map(|c| c.item.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn weighted_normalised_with_empty_source_reproduces_other_order() {
        let l: Vec<Candidate> = vec![];
        let v = vec![vec_("x", 0.2), vec_("y", 0.8)];

        let fused = fuse(
            &l,
            &v,
            FusionPolicy::Weighted,
            FusionWeights {
                lexical: 0.0,
                vector: 1.0,
            },
            100,
        )
        .unwrap();

        let order: Vec<&str> = fused.iter().map(|c| c.item.id.as_str()).collect();
        assert_eq!(order, vec!["y", "x"]);
    }

    #[test]
    fn normalised_scores_lie_in_unit_interval_and_top_reaches_one() {
        let raw = vec![
            ("a".to_string(), 10.0),
            ("b".to_string(), 4.0),
            ("c".to_string(), 1.0),
        ];
        let normalised = min_max_normalise(&raw);
        assert!(normalised.values().all(|v| (0.0..=1.0).contains(v)));
        assert!(normalised.values().any(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn non_summing_weights_are_renormalised_not_rejected() {
        let l = vec![lex("a", 1.0)];
        let v = vec![vec_("a", 1.0)];
        let fused = fuse(
            &l,
            &v,
            FusionPolicy::Weighted,
            FusionWeights {
                lexical: 2.0,
                vector: 2.0,
            },
            10,
        )
        .unwrap();
        assert!((fused[0].fused_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn invalid_weights_fail_before_computation() {
        let l = vec![lex("a", 1.0)];
        let v = vec![vec_("a", 1.0)];
        let result = fuse(
            &l,
            &v,
            FusionPolicy::Weighted,
            FusionWeights {
                lexical: 0.0,
                vector: 0.0,
            },
            10,
        );
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
    }

    #[test]
    fn rrf_ignores_invalid_weights() {
        let l = vec![lex("a", 1.0)];
        let v = vec![vec_("a", 1.0)];
        let result = fuse(
            &l,
            &v,
            FusionPolicy::Rrf,
            FusionWeights {
                lexical: 0.0,
                vector: 0.0,
            },
            10,
        );
        assert!(result.is_ok());
    }
}
