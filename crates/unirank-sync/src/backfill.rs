//! Top up under-represented countries with clearly tagged filler records.

use std::collections::{BTreeSet, HashSet};

use rand::Rng;
use unirank_core::{normalize_name_key, UniversityRecord, SYNTHETIC_SOURCE_ID};

use crate::merge::{avatar_url, sample_rating, sample_tuition, DEFAULT_FACILITIES, DEFAULT_MAJORS};

pub const DEFAULT_MIN_PER_COUNTRY: usize = 30;

const INSTITUTION_TYPES: &[&str] = &[
    "University",
    "Institute of Technology",
    "College",
    "Polytechnic University",
    "University of Science",
    "Normal University",
];

/// Requested countries, trimmed and de-duplicated case-insensitively, first spelling kept.
pub fn dedup_countries(countries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    countries
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub fn placeholder_name(country: &str, ordinal: usize) -> String {
    let kind = INSTITUTION_TYPES[(ordinal.saturating_sub(1)) % INSTITUTION_TYPES.len()];
    format!("{country} {ordinal} {kind}")
}

fn filler<R: Rng + ?Sized>(name: String, country: &str, rng: &mut R) -> UniversityRecord {
    UniversityRecord {
        id: None,
        description: Some(format!(
            "{name} is a comprehensive institution in {country} offering undergraduate and graduate programmes."
        )),
        image_url: Some(avatar_url(&name)),
        name,
        country: country.to_string(),
        city: None,
        location: Some(country.to_string()),
        rank: None,
        score: None,
        website: None,
        sources: BTreeSet::from([SYNTHETIC_SOURCE_ID.to_string()]),
        source_urls: Vec::new(),
        rating: sample_rating(rng),
        tuition: Some(sample_tuition(rng)),
        majors: Some(DEFAULT_MAJORS.to_string()),
        facilities: Some(DEFAULT_FACILITIES.to_string()),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompletenessBackfill;

impl CompletenessBackfill {
    /// Existing records are returned untouched and first; fillers are appended per country.
    /// Returns the combined list and the number of fillers created.
    pub fn backfill<R: Rng + ?Sized>(
        &self,
        records: Vec<UniversityRecord>,
        countries: &[String],
        min_per_country: usize,
        rng: &mut R,
    ) -> (Vec<UniversityRecord>, usize) {
        let mut taken: HashSet<String> = records.iter().map(UniversityRecord::name_key).collect();
        let mut out = records;
        let mut synthesized = 0;

        for country in dedup_countries(countries) {
            let existing = out.iter().filter(|r| r.in_country(&country)).count();
            if existing >= min_per_country {
                continue;
            }
            let missing = min_per_country - existing;
            let mut ordinal = existing;
            for _ in 0..missing {
                let name = loop {
                    ordinal += 1;
                    let candidate = placeholder_name(&country, ordinal);
                    if taken.insert(normalize_name_key(&candidate)) {
                        break candidate;
                    }
                };
                out.push(filler(name, &country, rng));
                synthesized += 1;
            }
            tracing::info!(country = %country, existing, synthesized = missing, "backfilled country");
        }

        (out, synthesized)
    }
}
