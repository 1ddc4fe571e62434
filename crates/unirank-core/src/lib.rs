//! Core domain model for the university ranking aggregation pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod countries;

pub use countries::{canonical_country, find_country_in, lookup_country, KnownCountry, KNOWN_COUNTRIES};

pub const CRATE_NAME: &str = "unirank-core";

/// Country value used when neither the explicit field nor the location resolves.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Provenance tag carried by filler records produced by completeness backfill.
pub const SYNTHETIC_SOURCE_ID: &str = "synthetic";

pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingType {
    #[default]
    World,
    Subject,
    Region,
}

impl RankingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingType::World => "world",
            RankingType::Subject => "subject",
            RankingType::Region => "region",
        }
    }
}

impl fmt::Display for RankingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ranking type `{0}` (expected world, subject or region)")]
pub struct UnknownRankingType(pub String);

impl FromStr for RankingType {
    type Err = UnknownRankingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "world" => Ok(RankingType::World),
            "subject" => Ok(RankingType::Subject),
            "region" => Ok(RankingType::Region),
            other => Err(UnknownRankingType(other.to_string())),
        }
    }
}

/// Per-call selection handed to a source adapter (one country at a time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCriteria {
    pub country: String,
    pub year: i32,
    pub ranking_type: RankingType,
    pub subject: Option<String>,
    pub region: Option<String>,
}

impl FetchCriteria {
    pub fn world(country: impl Into<String>, year: i32) -> Self {
        Self {
            country: country.into(),
            year,
            ranking_type: RankingType::World,
            subject: None,
            region: None,
        }
    }
}

/// Scale a source publishes its overall score on. Canonical storage is 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    #[default]
    Percent,
    OutOfTen,
    OutOfFive,
}

impl ScoreScale {
    pub fn factor(&self) -> f64 {
        match self {
            ScoreScale::Percent => 1.0,
            ScoreScale::OutOfTen => 10.0,
            ScoreScale::OutOfFive => 20.0,
        }
    }

    pub fn to_percent(&self, value: f64) -> f64 {
        value * self.factor()
    }
}

/// Loosely-shaped record straight out of an adapter. Nothing here is validated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: String,
    pub rank: Option<String>,
    pub score: Option<String>,
    pub country: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub detail_url: Option<String>,
    pub website: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub description: Option<String>,
    pub tuition: Option<String>,
    pub majors: Option<String>,
    pub facilities: Option<String>,
    /// Provenance already attached upstream (cache replay). Empty for live rows.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl RawRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Canonical post-normalization value; one per surviving raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUniversity {
    pub name: String,
    pub country: String,
    pub city: Option<String>,
    pub location: Option<String>,
    pub rank: Option<u32>,
    pub score: Option<f64>,
    pub website: Option<String>,
    pub image_url: Option<String>,
    pub detail_url: Option<String>,
    pub description: Option<String>,
    pub tuition: Option<f64>,
    pub majors: Option<String>,
    pub facilities: Option<String>,
    pub source_id: String,
    pub source_url: Option<String>,
    /// Stored provenance; when non-empty it stands in for `source_id` during merge.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl CandidateUniversity {
    pub fn new(name: impl Into<String>, country: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            city: None,
            location: None,
            rank: None,
            score: None,
            website: None,
            image_url: None,
            detail_url: None,
            description: None,
            tuition: None,
            majors: None,
            facilities: None,
            source_id: source_id.into(),
            source_url: None,
            sources: Vec::new(),
        }
    }

    pub fn name_key(&self) -> String {
        normalize_name_key(&self.name)
    }

    pub fn has_known_country(&self) -> bool {
        self.country != UNKNOWN_COUNTRY
    }

    /// Source ids this candidate contributes to a merged record.
    pub fn provenance(&self) -> Vec<&str> {
        if self.sources.is_empty() {
            vec![self.source_id.as_str()]
        } else {
            self.sources.iter().map(String::as_str).collect()
        }
    }
}

/// Merged, persisted entity. The only type that crosses the store boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
    pub rating: f64,
    #[serde(default)]
    pub tuition: Option<f64>,
    #[serde(default)]
    pub majors: Option<String>,
    #[serde(default)]
    pub facilities: Option<String>,
}

impl UniversityRecord {
    pub fn name_key(&self) -> String {
        normalize_name_key(&self.name)
    }

    pub fn stable_id(&self) -> Uuid {
        university_id(&self.name_key())
    }

    /// True when every contributing source is generated rather than scraped.
    pub fn is_synthetic_only(&self) -> bool {
        !self.sources.is_empty()
            && self
                .sources
                .iter()
                .all(|s| s.starts_with(SYNTHETIC_SOURCE_ID))
    }

    pub fn in_country(&self, country: &str) -> bool {
        self.country.trim().eq_ignore_ascii_case(country.trim())
    }
}

/// Identity key: trimmed, case-insensitive name.
pub fn normalize_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Deterministic id for a name key, shared by every store implementation.
pub fn university_id(name_key: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("unirank:university:{name_key}").as_bytes(),
    )
}

/// Map a canonical 0–100 score onto the 1–5 rating scale.
pub fn rating_from_score(score: f64) -> f64 {
    (score / 20.0).clamp(RATING_MIN, RATING_MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistFailure {
    pub name: String,
    pub message: String,
}

/// Externally visible outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_records: usize,
    pub per_country_counts: BTreeMap<String, usize>,
    pub created_count: usize,
    pub updated_count: usize,
    pub failures: Vec<PersistFailure>,
    pub source_counts: BTreeMap<String, usize>,
    pub dropped_records: usize,
    pub synthesized_records: usize,
}
