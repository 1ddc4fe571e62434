//! Field-level merge of one identity group into a single record.

use std::collections::BTreeSet;

use rand::Rng;
use unirank_core::{rating_from_score, CandidateUniversity, UniversityRecord, UNKNOWN_COUNTRY};

pub const DEFAULT_MAJORS: &str = "Engineering, Computer Science, Business Administration, Medicine, Law, Natural Sciences";
pub const DEFAULT_FACILITIES: &str =
    "Central library, research laboratories, student housing, sports centre, career services";

pub fn describe(name: &str, country: &str, city: Option<&str>) -> String {
    match city {
        Some(city) => format!("{name} is a higher-education institution in {city}, {country}."),
        None => format!("{name} is a higher-education institution in {country}."),
    }
}

pub fn avatar_url(name: &str) -> String {
    format!("https://ui-avatars.com/api/?name={}&background=random", encode_component(name))
}

fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Uniform in [3.0, 5.0], one decimal.
pub fn sample_rating<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    f64::from(rng.random_range(30u32..=50)) / 10.0
}

/// Uniform in [10 000, 40 000], rounded to 100.
pub fn sample_tuition<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    f64::from(rng.random_range(100u32..=400) * 100)
}

fn first_some<T: Clone>(group: &[CandidateUniversity], field: impl Fn(&CandidateUniversity) -> Option<&T>) -> Option<T> {
    group.iter().find_map(|c| field(c).cloned())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MergeEngine;

impl MergeEngine {
    /// First-non-absent-wins per field, in arrival order. `None` only for an empty group.
    pub fn merge<R: Rng + ?Sized>(&self, group: &[CandidateUniversity], rng: &mut R) -> Option<UniversityRecord> {
        let head = group.first()?;

        let country = group
            .iter()
            .find(|c| c.has_known_country())
            .map(|c| c.country.clone())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

        let mut sources = BTreeSet::new();
        let mut source_urls = Vec::new();
        for candidate in group {
            sources.extend(candidate.provenance().into_iter().map(str::to_string));
            if let Some(url) = &candidate.source_url {
                source_urls.push(url.clone());
            }
        }

        let name = head.name.trim().to_string();
        let city = first_some(group, |c| c.city.as_ref());
        let score = group.iter().find_map(|c| c.score);
        let detail_url = first_some(group, |c| c.detail_url.as_ref());

        let rating = match score {
            Some(score) => rating_from_score(score),
            None => sample_rating(rng),
        };
        let website = first_some(group, |c| c.website.as_ref())
            .or(detail_url)
            .or_else(|| source_urls.first().cloned());
        let image_url = first_some(group, |c| c.image_url.as_ref()).or_else(|| Some(avatar_url(&name)));
        let description = first_some(group, |c| c.description.as_ref())
            .or_else(|| Some(describe(&name, &country, city.as_deref())));
        let tuition = group
            .iter()
            .find_map(|c| c.tuition)
            .or_else(|| Some(sample_tuition(rng)));

        Some(UniversityRecord {
            id: None,
            city,
            location: first_some(group, |c| c.location.as_ref()),
            rank: group.iter().find_map(|c| c.rank),
            score,
            website,
            image_url,
            description,
            sources,
            source_urls,
            rating,
            tuition,
            majors: first_some(group, |c| c.majors.as_ref()).or_else(|| Some(DEFAULT_MAJORS.to_string())),
            facilities: first_some(group, |c| c.facilities.as_ref())
                .or_else(|| Some(DEFAULT_FACILITIES.to_string())),
            name,
            country,
        })
    }

    pub fn merge_all<R: Rng + ?Sized>(
        &self,
        groups: &[Vec<CandidateUniversity>],
        rng: &mut R,
    ) -> Vec<UniversityRecord> {
        groups.iter().filter_map(|g| self.merge(g, rng)).collect()
    }
}
