//! Source adapter contract plus the live, synthetic and cached-file adapters and the profile-page scraper.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use unirank_core::{canonical_country, find_country_in, FetchCriteria, RawRecord, ScoreScale};
use unirank_storage::{FetchError, HttpFetcher};
use uuid::Uuid;

mod cached;
mod detail;
mod html;
mod qs;
mod synthetic;
mod the;
mod usnews;

pub use cached::CachedFileAdapter;
pub use detail::{fetch_university_details, is_scrapable_detail_url, parse_detail_page, UniversityDetails};
pub use html::{absolutize_url, slugify, SelectorSet};
pub use qs::QsRankingsAdapter;
pub use synthetic::SyntheticRankingsAdapter;
pub use the::TimesHigherEducationAdapter;
pub use usnews::UsNewsAdapter;

pub const CRATE_NAME: &str = "unirank-adapters";

pub const QS_SOURCE_ID: &str = "qs-rankings";
pub const THE_SOURCE_ID: &str = "the-rankings";
pub const USNEWS_SOURCE_ID: &str = "usnews";
pub const SYNTHETIC_RANKINGS_SOURCE_ID: &str = "synthetic-rankings";
pub const CACHED_FILE_SOURCE_ID: &str = "cached-file";

/// Built-in sources in registry order.
pub const BUILTIN_SOURCE_IDS: &[&str] = &[
    QS_SOURCE_ID,
    THE_SOURCE_ID,
    USNEWS_SOURCE_ID,
    SYNTHETIC_RANKINGS_SOURCE_ID,
    CACHED_FILE_SOURCE_ID,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LiveHtml,
    Synthetic,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub cache_path: PathBuf,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            run_id,
            fetched_at: Utc::now(),
            cache_path: cache_path.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("no rows matched primary or fallback selectors at {url}")]
    NoMatches { url: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn kind(&self) -> SourceKind;

    /// Scale this source publishes its overall score on.
    fn score_scale(&self) -> ScoreScale {
        ScoreScale::Percent
    }

    async fn try_fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        criteria: &FetchCriteria,
    ) -> Result<Vec<RawRecord>, AdapterError>;

    /// Never fails: every error is logged and turned into an empty result.
    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext, criteria: &FetchCriteria) -> Vec<RawRecord> {
        match self.try_fetch(http, ctx, criteria).await {
            Ok(records) => {
                info!(
                    source_id = self.source_id(),
                    country = %criteria.country,
                    records = records.len(),
                    "adapter fetch complete"
                );
                records
            }
            Err(err) => {
                warn!(
                    source_id = self.source_id(),
                    country = %criteria.country,
                    error = %err,
                    "adapter fetch failed; continuing with no records"
                );
                Vec::new()
            }
        }
    }
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        QS_SOURCE_ID => Some(Box::new(QsRankingsAdapter)),
        THE_SOURCE_ID => Some(Box::new(TimesHigherEducationAdapter)),
        USNEWS_SOURCE_ID => Some(Box::new(UsNewsAdapter)),
        SYNTHETIC_RANKINGS_SOURCE_ID => Some(Box::new(SyntheticRankingsAdapter::default())),
        CACHED_FILE_SOURCE_ID => Some(Box::new(CachedFileAdapter)),
        _ => None,
    }
}

/// Country a raw row resolves to, using the explicit field first and the location second.
pub(crate) fn row_country(raw: &RawRecord) -> Option<&'static str> {
    raw.country
        .as_deref()
        .and_then(|c| canonical_country(c).or_else(|| find_country_in(c)))
        .or_else(|| raw.location.as_deref().and_then(find_country_in))
}

/// Whether a row belongs to the requested country.
pub(crate) fn row_matches_country(raw: &RawRecord, wanted: &str) -> bool {
    let wanted = canonical_country(wanted).unwrap_or(wanted.trim());
    match row_country(raw) {
        Some(found) => found.eq_ignore_ascii_case(wanted),
        None => raw
            .country
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(wanted)),
    }
}

pub(crate) async fn fetch_page(
    http: &HttpFetcher,
    ctx: &AdapterContext,
    source_id: &str,
    url: &str,
) -> Result<String, AdapterError> {
    let page = http.fetch_page(ctx.run_id, source_id, url).await?;
    Ok(page.html)
}
