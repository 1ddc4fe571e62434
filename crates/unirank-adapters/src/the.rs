use async_trait::async_trait;
use unirank_core::{FetchCriteria, RankingType, RawRecord};
use unirank_storage::HttpFetcher;

use crate::html::{extract_with_fallback, slugify, SelectorSet};
use crate::{fetch_page, row_matches_country, AdapterContext, AdapterError, SourceAdapter, SourceKind, THE_SOURCE_ID};

pub const THE_ORIGIN: &str = "https://www.timeshighereducation.com";

// Country comes from the free-text location column on both layouts.
const PRIMARY: SelectorSet = SelectorSet {
    row: "tr.ranking-row",
    name: ".ranking-institution-title",
    rank: Some(".rank"),
    country: None,
    location: Some(".location"),
    score: Some(".overall-score"),
    link: Some("a.ranking-institution-title"),
};

const FALLBACK: SelectorSet = SelectorSet {
    row: ".ranking-institution-row",
    name: ".uni-link",
    rank: Some(".rank"),
    country: Some(".country"),
    location: Some(".location"),
    score: Some(".overall .value"),
    link: Some(".uni-link a"),
};

/// timeshighereducation.com ranking tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimesHigherEducationAdapter;

impl TimesHigherEducationAdapter {
    pub fn listing_url(criteria: &FetchCriteria) -> String {
        let base = format!("{THE_ORIGIN}/world-university-rankings/{}", criteria.year);
        match criteria.ranking_type {
            RankingType::World => format!("{base}/world-ranking"),
            RankingType::Subject => format!(
                "{base}/subject-ranking/{}",
                slugify(criteria.subject.as_deref().unwrap_or_default())
            ),
            RankingType::Region => format!(
                "{base}/regional-ranking/{}",
                slugify(criteria.region.as_deref().unwrap_or_default())
            ),
        }
    }

    pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<RawRecord>, AdapterError> {
        extract_with_fallback(html, THE_ORIGIN, page_url, &PRIMARY, &FALLBACK)
    }
}

#[async_trait]
impl SourceAdapter for TimesHigherEducationAdapter {
    fn source_id(&self) -> &'static str {
        THE_SOURCE_ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LiveHtml
    }

    async fn try_fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        criteria: &FetchCriteria,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let url = Self::listing_url(criteria);
        let html = fetch_page(http, ctx, THE_SOURCE_ID, &url).await?;
        let rows = Self::parse_listing(&html, &url)?;
        Ok(rows
            .into_iter()
            .filter(|raw| row_matches_country(raw, &criteria.country))
            .collect())
    }
}
