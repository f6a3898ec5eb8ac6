//! Entity gazetteers: value and synonym lookup over token spans.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::tokenize::{Token, normalize, tokenize};
use crate::corpus::CorpusEntity;

/// One matchable surface form of an entity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Variant {
    tokens: Vec<String>,
    canonical: String,
}

/// All surface forms of one entity plus its matching flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gazetteer {
    pub entity: String,
    pub automatically_extensible: bool,
    pub matching_strictness: f64,
    variants: Vec<Variant>,
}

/// A span of input tokens resolved to a canonical entity value.
#[derive(Debug, Clone, PartialEq)]
pub struct GazetteerMatch {
    pub entity: String,
    /// Token index range in the input.
    pub tokens: Range<usize>,
    pub canonical: String,
    /// Fraction of the matched variant's tokens covered by the span.
    pub score: f64,
}

impl GazetteerMatch {
    fn len(&self) -> usize {
        self.tokens.end - self.tokens.start
    }

    fn overlaps(&self, other: &GazetteerMatch) -> bool {
        self.tokens.start < other.tokens.end && other.tokens.start < self.tokens.end
    }
}

impl Gazetteer {
    pub fn from_entity(name: &str, entity: &CorpusEntity) -> Self {
        let mut variants = Vec::new();
        for value in &entity.data {
            let mut push = |surface: &str| {
                let tokens: Vec<String> = tokenize(surface).into_iter().map(|t| t.value).collect();
                if !tokens.is_empty() {
                    variants.push(Variant {
                        tokens,
                        canonical: value.value.clone(),
                    });
                }
            };
            push(&value.value);
            if entity.use_synonyms {
                value.synonyms.iter().for_each(|s| push(s));
            }
        }

        Self {
            entity: name.to_string(),
            automatically_extensible: entity.automatically_extensible,
            matching_strictness: entity.matching_strictness,
            variants,
        }
    }

    /// Canonical value for a raw span that matches a variant exactly.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let key = normalize(raw);
        self.variants
            .iter()
            .find(|v| v.tokens.join(" ") == key)
            .map(|v| v.canonical.as_str())
    }

    /// Non-overlapping matches in the input, ordered by position.
    ///
    /// A span matches a variant when its tokens appear contiguously in the
    /// variant and cover at least `matching_strictness` of it.
    pub fn find_matches(&self, tokens: &[Token]) -> Vec<GazetteerMatch> {
        let max_len = self.variants.iter().map(|v| v.tokens.len()).max().unwrap_or(0);
        let mut candidates = Vec::new();

        for start in 0..tokens.len() {
            let longest = max_len.min(tokens.len() - start);
            for len in 1..=longest {
                let span: Vec<&str> = tokens[start..start + len]
                    .iter()
                    .map(|t| t.value.as_str())
                    .collect();
                let best = self
                    .variants
                    .iter()
                    .filter(|v| contains_contiguous(&v.tokens, &span))
                    .map(|v| (len as f64 / v.tokens.len() as f64, v))
                    .filter(|(score, _)| *score + f64::EPSILON >= self.matching_strictness)
                    .max_by(|a, b| a.0.total_cmp(&b.0));
                if let Some((score, variant)) = best {
                    candidates.push(GazetteerMatch {
                        entity: self.entity.clone(),
                        tokens: start..start + len,
                        canonical: variant.canonical.clone(),
                        score,
                    });
                }
            }
        }

        select_non_overlapping(candidates)
    }
}

fn contains_contiguous(haystack: &[String], needle: &[&str]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
}

/// Greedy selection preferring longer spans, then better coverage, then
/// earlier position. Result is ordered by position.
pub fn select_non_overlapping(mut candidates: Vec<GazetteerMatch>) -> Vec<GazetteerMatch> {
    candidates.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(b.score.total_cmp(&a.score))
            .then(a.tokens.start.cmp(&b.tokens.start))
    });

    let mut selected: Vec<GazetteerMatch> = Vec::new();
    for candidate in candidates {
        if selected.iter().all(|s| !s.overlaps(&candidate)) {
            selected.push(candidate);
        }
    }
    selected.sort_by_key(|m| m.tokens.start);
    selected
}
