use std::fs;
use std::path::{Path, PathBuf};

use unirank_adapters::{
    fetch_university_details, parse_detail_page, AdapterContext, AdapterError, CachedFileAdapter, QsRankingsAdapter,
    SourceAdapter, TimesHigherEducationAdapter, UsNewsAdapter,
};
use unirank_core::FetchCriteria;
use unirank_storage::{HttpClientConfig, HttpFetcher};
use uuid::Uuid;

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(rel)
}

fn read_fixture(rel: &str) -> String {
    fs::read_to_string(fixture(rel)).expect("read fixture")
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig::default()).expect("fetcher")
}

#[test]
fn qs_primary_layout_extracts_rows_and_resolves_links() {
    let url = "https://www.topuniversities.com/university-rankings/world-university-rankings/2024";
    let rows = QsRankingsAdapter::parse_listing(&read_fixture("qs-rankings/world-2024.html"), url).unwrap();

    assert_eq!(rows.len(), 5);
    let tokyo = rows.iter().find(|r| r.name == "The University of Tokyo").unwrap();
    assert_eq!(tokyo.rank.as_deref(), Some("=28"));
    assert_eq!(tokyo.score.as_deref(), Some("87.3"));
    assert_eq!(tokyo.country.as_deref(), Some("Japan"));
    assert_eq!(
        tokyo.detail_url.as_deref(),
        Some("https://www.topuniversities.com/universities/university-tokyo")
    );
    assert_eq!(tokyo.source_url.as_deref(), Some(url));

    let kyoto = rows.iter().find(|r| r.name == "Kyoto University").unwrap();
    assert_eq!(
        kyoto.detail_url.as_deref(),
        Some("https://www.topuniversities.com/universities/kyoto-university")
    );
}

#[test]
fn qs_list_layout_is_used_when_table_layout_is_missing() {
    let rows = QsRankingsAdapter::parse_listing(
        &read_fixture("qs-rankings/world-2024-list-layout.html"),
        "https://www.topuniversities.com/university-rankings/world-university-rankings/2024",
    )
    .unwrap();

    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["University of Oxford", "University of Warwick", "Peking University"]);
    assert_eq!(rows[0].location.as_deref(), Some("Oxford, United Kingdom"));
    assert_eq!(rows[1].rank.as_deref(), Some("N/A"));
}

#[test]
fn the_rows_carry_location_text_for_country_resolution() {
    let rows = TimesHigherEducationAdapter::parse_listing(
        &read_fixture("the-rankings/world-2025.html"),
        "https://www.timeshighereducation.com/world-university-rankings/2025/world-ranking",
    )
    .unwrap();

    assert_eq!(rows.len(), 3);
    let hku = &rows[2];
    assert_eq!(hku.name, "The University of Hong Kong");
    assert_eq!(hku.location.as_deref(), Some("Hong Kong SAR, China"));
    assert!(hku.country.is_none());
    assert_eq!(
        hku.detail_url.as_deref(),
        Some("https://www.timeshighereducation.com/world-university-rankings/university-hong-kong")
    );
}

#[test]
fn usnews_rows_get_city_country_and_leading_rank_token() {
    let rows = UsNewsAdapter::parse_listing(
        &read_fixture("usnews/national-universities.html"),
        "https://www.usnews.com/best-colleges/rankings/national-universities",
    )
    .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].name, "Massachusetts Institute of Technology");
    assert_eq!(rows[1].rank.as_deref(), Some("#2"));
    assert_eq!(rows[1].city.as_deref(), Some("Cambridge"));
    assert!(rows.iter().all(|r| r.country.as_deref() == Some("United States")));
    assert_eq!(rows[2].rank.as_deref(), Some("Unranked"));
}

#[test]
fn qs_profile_page_yields_details() {
    let details = parse_detail_page(&read_fixture("qs-rankings/detail-kyoto-university.html")).unwrap();

    assert_eq!(details.name.as_deref(), Some("Kyoto University"));
    assert_eq!(details.location.as_deref(), Some("Kyoto, Japan"));
    assert_eq!(details.website.as_deref(), Some("https://www.kyoto-u.ac.jp/en"));
    assert!(details.description.as_deref().unwrap().starts_with("Kyoto University is a national"));
    assert!(details.description.as_deref().unwrap().ends_with("natural sciences."));
    assert_eq!(details.scores.len(), 3);
    assert_eq!(details.scores.get("Academic Reputation"), Some(&Some(92.4)));
    assert_eq!(details.scores.get("International Students"), Some(&None));
    assert_eq!(details.facilities.len(), 3);
    assert_eq!(details.facilities[0], "Main library");
}

#[tokio::test]
async fn detail_links_outside_topuniversities_are_not_fetched() {
    let ctx = AdapterContext::new(Uuid::new_v4(), "unused.json");
    let details = fetch_university_details(&fetcher(), &ctx, "https://www.usnews.com/best-colleges/mit-2178")
        .await
        .unwrap();
    assert!(details.is_none());
}

#[test]
fn unrecognised_markup_is_a_parse_mismatch() {
    let err = QsRankingsAdapter::parse_listing("<html><body><p>Access denied</p></body></html>", "https://x")
        .unwrap_err();
    assert!(matches!(err, AdapterError::NoMatches { .. }));
}

#[tokio::test]
async fn cached_file_adapter_filters_by_country() {
    let ctx = AdapterContext::new(Uuid::new_v4(), fixture("cached-file/universities.json"));
    let records = CachedFileAdapter
        .try_fetch(&fetcher(), &ctx, &FetchCriteria::world("Canada", 2024))
        .await
        .unwrap();

    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["McGill University", "University of British Columbia"]);
    assert_eq!(records[0].score.as_deref(), Some("86.0"));
    assert_eq!(records[0].sources, vec!["qs-rankings"]);
    assert!(records[1].score.is_none());
}

#[tokio::test]
async fn cached_file_adapter_without_a_file_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = AdapterContext::new(Uuid::new_v4(), dir.path().join("missing.json"));
    let records = CachedFileAdapter
        .try_fetch(&fetcher(), &ctx, &FetchCriteria::world("Canada", 2024))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn fetch_swallows_errors_into_an_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("universities.json");
    fs::write(&path, "{ not json").unwrap();
    let ctx = AdapterContext::new(Uuid::new_v4(), &path);

    let criteria = FetchCriteria::world("Canada", 2024);
    assert!(CachedFileAdapter.try_fetch(&fetcher(), &ctx, &criteria).await.is_err());
    assert!(CachedFileAdapter.fetch(&fetcher(), &ctx, &criteria).await.is_empty());
}

#[tokio::test]
async fn usnews_skips_the_network_outside_the_united_states() {
    let ctx = AdapterContext::new(Uuid::new_v4(), "unused.json");
    let records = UsNewsAdapter
        .try_fetch(&fetcher(), &ctx, &FetchCriteria::world("Japan", 2024))
        .await
        .unwrap();
    assert!(records.is_empty());
}
