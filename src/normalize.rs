//! query normalisation (C1): lower-case/trim/expand abbreviations and
//! synonyms while preserving literal identifiers, in the fixed order
//! spec §4.1 lays out.
//!
//! built as an ordered pipeline of pure functions over `QueryTransformation`,
//! mirroring how the teacher's `filter.rs` composes independent predicates
//! (`BlocklistFilter`, `ExcludePatternFilter`) into `ContentFilter`.

use crate::model::{NormalizeOptions, QueryTransformation};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static IDENTIFIER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bTC_\d+\b").unwrap(),
        Regex::new(r"(?i)\bHC-\d+\b").unwrap(),
        Regex::new(r"(?i)\bUS-\d+\b").unwrap(),
    ]
});

fn builtin_abbreviations() -> HashMap<String, String> {
    [
        ("tc", "test case"),
        ("hc", "healthcare"),
        ("pt", "patient"),
        ("pts", "patients"),
        ("mgmt", "management"),
        ("appt", "appointment"),
        ("rx", "prescription"),
        ("dx", "diagnosis"),
        ("emr", "electronic medical record"),
        ("ehr", "electronic health record"),
        ("er", "emergency room"),
        ("uat", "user acceptance testing"),
        ("qa", "quality assurance"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn builtin_synonyms() -> HashMap<String, Vec<String>> {
    [
        ("patient", vec!["client", "individual"]),
        ("consent", vec!["authorization", "permission"]),
        ("appointment", vec!["booking", "visit"]),
        ("cancel", vec!["void", "terminate"]),
        ("verify", vec!["validate", "confirm"]),
        ("notification", vec!["alert", "reminder"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
    .collect()
}

/// collapse internal whitespace and lower-case; unicode normalisation is
/// covered by `str::to_lowercase`'s full case folding over NFC input.
fn basic_normalise(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// tokens matching a domain identifier pattern, preserved verbatim
/// (case included) so abbreviation/synonym rewriting skips them.
fn protected_tokens(original: &str) -> Vec<String> {
    if !IDENTIFIER_PATTERNS.iter().any(|re| re.is_match(original)) {
        return Vec::new();
    }
    original
        .split_whitespace()
        .filter(|tok| IDENTIFIER_PATTERNS.iter().any(|re| re.is_match(tok)))
        .map(|s| s.to_string())
        .collect()
}

fn expand_abbreviations(
    normalised: &str,
    protected: &[String],
    table: &HashMap<String, String>,
) -> (String, Vec<String>) {
    let mut applied = Vec::new();
    let rewritten: Vec<String> = normalised
        .split_whitespace()
        .map(|token| {
            if protected.iter().any(|p| p.eq_ignore_ascii_case(token)) {
                return token.to_string();
            }
            let stripped = token.trim_matches(|c: char| !c.is_alphanumeric());
            match table.get(stripped) {
                Some(expansion) => {
                    applied.push(stripped.to_string());
                    expansion.clone()
                }
                None => token.to_string(),
            }
        })
        .collect();
    (rewritten.join(" "), applied)
}

fn expand_synonyms(
    normalised: &str,
    max_variations: usize,
    table: &HashMap<String, Vec<String>>,
) -> (Vec<String>, Vec<String>) {
    let tokens: Vec<&str> = normalised.split_whitespace().collect();
    let mut applied = Vec::new();
    let mut expansions = vec![normalised.to_string()];

    for (token_idx, token) in tokens.iter().enumerate() {
        if let Some(synonyms) = table.get(*token) {
            for synonym in synonyms.iter().take(max_variations) {
                applied.push(token.to_string());
                let mut rewritten = tokens.clone();
                rewritten[token_idx] = synonym;
                let variant = rewritten.join(" ");
                if !expansions.contains(&variant) {
                    expansions.push(variant);
                }
            }
        }
    }

    (expansions, applied)
}

/// apply the fixed-order normalisation pipeline. an empty query yields an
/// empty-transformation record; rejecting it is the orchestrator's job.
pub fn normalize(query: &str, options: &NormalizeOptions) -> QueryTransformation {
    if query.trim().is_empty() {
        return QueryTransformation {
            original: query.to_string(),
            ..Default::default()
        };
    }

    let mut normalised = basic_normalise(query);

    let protected = if options.preserve_identifiers {
        protected_tokens(query)
    } else {
        Vec::new()
    };

    let mut abbreviations_applied = Vec::new();
    if options.enable_abbreviations {
        let mut table = builtin_abbreviations();
        table.extend(options.custom_abbreviations.clone());
        let (rewritten, applied) = expand_abbreviations(&normalised, &protected, &table);
        normalised = rewritten;
        abbreviations_applied = applied;
    }

    let mut expansions = vec![normalised.clone()];
    let mut synonyms_applied = Vec::new();
    if options.enable_synonyms {
        let mut table = builtin_synonyms();
        for (k, v) in &options.custom_synonyms {
            table.entry(k.clone()).or_default().extend(v.clone());
        }
        let (variants, applied) =
            expand_synonyms(&normalised, options.max_synonym_variations, &table);
        expansions = variants;
        synonyms_applied = applied;
    }

    QueryTransformation {
        original: query.to_string(),
        normalised,
        expansions,
        abbreviations_applied,
        synonyms_applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_abbreviations_and_preserves_identifiers() {
        let options = NormalizeOptions::default();
        let result = normalize("TC_1042 pt consent mgmt", &options);
        assert!(result.normalised.contains("patient"));
        assert!(result.normalised.contains("management"));
        assert!(result.normalised.contains("tc_1042"));
        assert!(result.abbreviations_applied.contains(&"pt".to_string()));
    }

    #[test]
    fn empty_query_yields_empty_transformation() {
        let result = normalize("", &NormalizeOptions::default());
        assert!(result.normalised.is_empty());
        assert!(result.expansions.is_empty());
    }

    #[test]
    fn preprocess_is_idempotent() {
        let options = NormalizeOptions::default();
        let first = normalize("pt consent verify", &options);
        let second = normalize(&first.normalised, &options);
        assert_eq!(first.normalised, second.normalised);
    }

    #[test]
    fn synonym_expansions_are_bounded_and_include_original_first() {
        let mut options = NormalizeOptions::default();
        options.max_synonym_variations = 1;
        let result = normalize("patient consent", &options);
        assert_eq!(result.expansions[0], result.normalised);
        // "patient" and "consent" each carry synonyms, so at most
        // max_synonym_variations expansions per token, plus the original.
        assert!(result.expansions.len() <= 1 + 2 * options.max_synonym_variations);
    }
}
