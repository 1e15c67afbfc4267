//! deduplicator (C5): removes near-duplicates among fused candidates using
//! Jaccard similarity over title tokens, threshold τ.
//!
//! no direct teacher precedent (the teacher has no dedup stage); built in
//! the teacher's idiom of a pure function plus colocated table-style
//! `#[cfg(test)]` assertions, matching `scoring.rs`'s `fuse_scores` tests.

use crate::model::{RankedCandidate, RemovedCandidate};
use std::collections::HashSet;

pub const DEFAULT_THRESHOLD: f32 = 0.85;

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn comparison_text(candidate: &RankedCandidate) -> String {
    let text = candidate.item.dedup_text();
    if text.is_empty() {
        candidate.item.full_document()
    } else {
        text.to_string()
    }
}

/// walk `candidates` in order; for each, compare against the set of
/// already-kept items. if any similarity >= threshold, mark it removed,
/// carrying the id of the first colliding kept item. O(n^2), acceptable
/// because n is a few dozen at this stage.
pub fn deduplicate(
    candidates: Vec<RankedCandidate>,
    threshold: f32,
) -> (Vec<RankedCandidate>, Vec<RemovedCandidate>) {
    let mut kept: Vec<RankedCandidate> = Vec::new();
    let mut kept_tokens: Vec<HashSet<String>> = Vec::new();
    let mut removed: Vec<RemovedCandidate> = Vec::new();

    for candidate in candidates {
        let tokens = token_set(&comparison_text(&candidate));
        let collision = kept_tokens
            .iter()
            .enumerate()
            .map(|(i, kt)| (i, jaccard_similarity(&tokens, kt)))
            .find(|(_, sim)| *sim >= threshold);

        match collision {
            Some((idx, similarity)) => removed.push(RemovedCandidate {
                item: candidate.item,
                duplicate_of: kept[idx].item.id.clone(),
                similarity,
            }),
            None => {
                kept_tokens.push(tokens);
                kept.push(candidate);
            }
        }
    }

    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use std::collections::HashSet as Set;

    fn candidate(id: &str, title: &str) -> RankedCandidate {
        RankedCandidate {
            item: Item {
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
            },
            lexical_raw_score: None,
            lexical_normalised_score: None,
            lexical_rank: None,
            vector_raw_score: None,
            vector_normalised_score: None,
            vector_rank: None,
            fused_score: 0.0,
            sources_found_in: Set::new(),
            rank_change: 0,
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let (kept, removed) = deduplicate(Vec::new(), DEFAULT_THRESHOLD);
        assert!(kept.is_empty());
        assert!(removed.is_empty());
    }

    #[test]
    fn identical_titles_at_full_threshold_are_removed() {
        let candidates = vec![
            candidate("1", "Patient Consent Verification"),
            candidate("2", "Appointment Reminder"),
            candidate("3", "Patient Consent Verification"),
            candidate("4", "Billing Export"),
        ];
        let (kept, removed) = deduplicate(candidates, 1.0);
        assert_eq!(kept.len(), 3);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].item.id, "3");
        assert_eq!(removed[0].duplicate_of, "1");
        assert!(kept.iter().map(|c| &c.item.title).collect::<Set<_>>().len() == kept.len());
    }

    #[test]
    fn five_item_list_with_one_collision_yields_four_kept() {
        let candidates = vec![
            candidate("a", "Patient Consent Verification"),
            candidate("b", "Appointment Reminder Email"),
            candidate("c", "Billing Statement Export"),
            candidate("d", "Appointment Reminder Email"),
            candidate("e", "Discharge Summary Review"),
        ];
        let (kept, removed) = deduplicate(candidates, 0.85);
        assert_eq!(kept.len(), 4);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].item.id, "d");
        assert_eq!(removed[0].duplicate_of, "b");
    }

    #[test]
    fn falls_back_to_full_document_when_title_is_empty() {
        let mut a = candidate("1", "");
        a.item.description = "shared description text here".to_string();
        let mut b = candidate("2", "");
        b.item.description = "shared description text here".to_string();
        let (kept, removed) = deduplicate(vec![a, b], 0.85);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed.len(), 1);
    }
}
