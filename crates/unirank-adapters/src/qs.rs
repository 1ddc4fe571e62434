use async_trait::async_trait;
use unirank_core::{FetchCriteria, RankingType, RawRecord};
use unirank_storage::HttpFetcher;

use crate::html::{extract_with_fallback, slugify, SelectorSet};
use crate::{fetch_page, row_matches_country, AdapterContext, AdapterError, SourceAdapter, SourceKind, QS_SOURCE_ID};

pub const QS_ORIGIN: &str = "https://www.topuniversities.com";

const PRIMARY: SelectorSet = SelectorSet {
    row: ".ranking-table tbody tr",
    name: ".uni-name",
    rank: Some("td:first-child"),
    country: Some(".country-name"),
    location: None,
    score: Some(".total-score"),
    link: Some(".uni-name a"),
};

const FALLBACK: SelectorSet = SelectorSet {
    row: ".ranking-list tr",
    name: ".uni-link",
    rank: Some(".rank"),
    country: Some(".country"),
    location: Some(".location"),
    score: Some(".overall-score"),
    link: Some(".uni-link a"),
};

/// topuniversities.com ranking tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct QsRankingsAdapter;

impl QsRankingsAdapter {
    pub fn listing_url(criteria: &FetchCriteria) -> String {
        let base = format!("{QS_ORIGIN}/university-rankings");
        match criteria.ranking_type {
            RankingType::World => format!("{base}/world-university-rankings/{}", criteria.year),
            RankingType::Subject => format!(
                "{base}/university-subject-rankings/{}/{}",
                criteria.year,
                slugify(criteria.subject.as_deref().unwrap_or_default())
            ),
            RankingType::Region => format!(
                "{base}/{}-university-rankings/{}",
                slugify(criteria.region.as_deref().unwrap_or_default()),
                criteria.year
            ),
        }
    }

    pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<RawRecord>, AdapterError> {
        extract_with_fallback(html, QS_ORIGIN, page_url, &PRIMARY, &FALLBACK)
    }
}

#[async_trait]
impl SourceAdapter for QsRankingsAdapter {
    fn source_id(&self) -> &'static str {
        QS_SOURCE_ID
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
        let html = fetch_page(http, ctx, QS_SOURCE_ID, &url).await?;
        let rows = Self::parse_listing(&html, &url)?;
        Ok(rows
            .into_iter()
            .filter(|raw| row_matches_country(raw, &criteria.country))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(ranking_type: RankingType) -> FetchCriteria {
        FetchCriteria {
            country: "Japan".to_string(),
            year: 2024,
            ranking_type,
            subject: Some("Computer Science".to_string()),
            region: Some("Asia".to_string()),
        }
    }

    #[test]
    fn listing_url_depends_on_ranking_type() {
        assert_eq!(
            QsRankingsAdapter::listing_url(&criteria(RankingType::World)),
            "https://www.topuniversities.com/university-rankings/world-university-rankings/2024"
        );
        assert_eq!(
            QsRankingsAdapter::listing_url(&criteria(RankingType::Subject)),
            "https://www.topuniversities.com/university-rankings/university-subject-rankings/2024/computer-science"
        );
        assert_eq!(
            QsRankingsAdapter::listing_url(&criteria(RankingType::Region)),
            "https://www.topuniversities.com/university-rankings/asia-university-rankings/2024"
        );
    }
}
