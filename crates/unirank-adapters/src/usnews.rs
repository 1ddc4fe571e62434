use async_trait::async_trait;
use tracing::debug;
use unirank_core::{canonical_country, FetchCriteria, RankingType, RawRecord};
use unirank_storage::HttpFetcher;

use crate::html::{extract_with_fallback, slugify, SelectorSet};
use crate::{fetch_page, AdapterContext, AdapterError, SourceAdapter, SourceKind, USNEWS_SOURCE_ID};

pub const USNEWS_ORIGIN: &str = "https://www.usnews.com";
const USNEWS_COUNTRY: &str = "United States";

const PRIMARY: SelectorSet = SelectorSet {
    row: ".sep-section",
    name: ".h3.heading a",
    rank: Some(".rank-holder"),
    country: None,
    location: Some(".location"),
    score: None,
    link: Some(".h3.heading a"),
};

const FALLBACK: SelectorSet = SelectorSet {
    row: "li.search-result",
    name: "h3 a",
    rank: Some(".ranklist-ranked-item"),
    country: None,
    location: Some(".location"),
    score: None,
    link: Some("h3 a"),
};

/// usnews.com college listings. Covers United States institutions only.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsNewsAdapter;

impl UsNewsAdapter {
    pub fn listing_url(criteria: &FetchCriteria) -> String {
        let base = format!("{USNEWS_ORIGIN}/best-colleges/rankings");
        match criteria.ranking_type {
            RankingType::World => format!("{base}/national-universities"),
            RankingType::Subject => {
                format!("{base}/{}", slugify(criteria.subject.as_deref().unwrap_or_default()))
            }
            RankingType::Region => format!(
                "{base}/regional-universities-{}",
                slugify(criteria.region.as_deref().unwrap_or_default())
            ),
        }
    }

    pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<RawRecord>, AdapterError> {
        let mut rows = extract_with_fallback(html, USNEWS_ORIGIN, page_url, &PRIMARY, &FALLBACK)?;
        for raw in &mut rows {
            raw.country = Some(USNEWS_COUNTRY.to_string());
            // "#12 in National Universities (tie)" keeps only "#12".
            raw.rank = raw
                .rank
                .as_deref()
                .and_then(|r| r.split_whitespace().next())
                .map(str::to_string);
            raw.city = raw
                .location
                .as_deref()
                .and_then(|loc| loc.split(',').next())
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }
        Ok(rows)
    }
}

#[async_trait]
impl SourceAdapter for UsNewsAdapter {
    fn source_id(&self) -> &'static str {
        USNEWS_SOURCE_ID
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
        if canonical_country(&criteria.country) != Some(USNEWS_COUNTRY) {
            debug!(country = %criteria.country, "usnews only lists United States institutions");
            return Ok(Vec::new());
        }
        let url = Self::listing_url(criteria);
        let html = fetch_page(http, ctx, USNEWS_SOURCE_ID, &url).await?;
        Self::parse_listing(&html, &url)
    }
}
