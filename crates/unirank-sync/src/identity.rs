//! Grouping candidates that denote the same institution.

use std::collections::HashMap;

use strsim::jaro_winkler;
use unirank_core::{normalize_name_key, CandidateUniversity};

pub trait IdentityResolver: Send + Sync {
    /// Groups in first-arrival order; members keep their arrival order.
    fn group(&self, candidates: Vec<CandidateUniversity>) -> Vec<Vec<CandidateUniversity>>;
}

/// Case-insensitive, whitespace-trimmed exact name match. Country is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactNameResolver;

impl IdentityResolver for ExactNameResolver {
    fn group(&self, candidates: Vec<CandidateUniversity>) -> Vec<Vec<CandidateUniversity>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<CandidateUniversity>> = Vec::new();
        for candidate in candidates {
            let key = candidate.name_key();
            match index.get(&key) {
                Some(&slot) => groups[slot].push(candidate),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![candidate]);
                }
            }
        }
        groups
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityConfig {
    pub threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { threshold: 0.93 }
    }
}

/// Fuzzy grouping: Jaro-Winkler over folded names plus a country-agreement tie-break.
///
/// Candidates whose countries are both known and differ are never grouped, even on an
/// exact name match.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityResolver {
    config: SimilarityConfig,
}

impl SimilarityResolver {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn fold_name(input: &str) -> String {
        normalize_name_key(input)
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .filter(|w| *w != "the")
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn similarity(&self, a: &CandidateUniversity, b: &CandidateUniversity) -> f64 {
        jaro_winkler(&Self::fold_name(&a.name), &Self::fold_name(&b.name))
    }

    fn countries_agree(a: &CandidateUniversity, b: &CandidateUniversity) -> bool {
        !(a.has_known_country() && b.has_known_country()) || a.country.eq_ignore_ascii_case(&b.country)
    }

    fn same_institution(&self, a: &CandidateUniversity, b: &CandidateUniversity) -> bool {
        Self::countries_agree(a, b) && self.similarity(a, b) >= self.config.threshold
    }
}

impl IdentityResolver for SimilarityResolver {
    fn group(&self, candidates: Vec<CandidateUniversity>) -> Vec<Vec<CandidateUniversity>> {
        let mut groups: Vec<Vec<CandidateUniversity>> = Vec::new();
        for candidate in candidates {
            // Match against each group's first member only.
            let slot = groups
                .iter()
                .position(|g| g.first().is_some_and(|head| self.same_institution(head, &candidate)));
            match slot {
                Some(slot) => groups[slot].push(candidate),
                None => groups.push(vec![candidate]),
            }
        }
        groups
    }
}
