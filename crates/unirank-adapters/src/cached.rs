use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;
use unirank_core::{FetchCriteria, RawRecord};
use unirank_storage::{HttpFetcher, UniversityCacheFile};

use crate::{row_matches_country, AdapterContext, AdapterError, SourceAdapter, SourceKind, CACHED_FILE_SOURCE_ID};

/// Reads the JSON cache written by previous runs. Zero network.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedFileAdapter;

fn json_text(value: &JsonValue, key: &str) -> Option<String> {
    match value.get(key)? {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CachedFileAdapter {
    /// Map one cache entry onto a raw record. Entries without a string name are skipped.
    /// The stored score is already on the 0-100 scale; the stored rating is never read back.
    pub fn entry_to_raw(entry: &JsonValue) -> Option<RawRecord> {
        let name = entry.get("name")?.as_str()?;
        let mut raw = RawRecord::named(name);
        raw.country = json_text(entry, "country");
        raw.city = json_text(entry, "city");
        raw.location = json_text(entry, "location");
        raw.rank = json_text(entry, "rank");
        raw.score = json_text(entry, "score");
        raw.website = json_text(entry, "website");
        raw.image_url = json_text(entry, "imageUrl");
        raw.description = json_text(entry, "description");
        raw.tuition = json_text(entry, "tuition");
        raw.majors = json_text(entry, "majors");
        raw.facilities = json_text(entry, "facilities");
        raw.source_url = entry
            .get("sourceUrls")
            .and_then(JsonValue::as_array)
            .and_then(|urls| urls.iter().find_map(JsonValue::as_str))
            .map(str::to_string);
        raw.sources = entry
            .get("sources")
            .and_then(JsonValue::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(raw)
    }
}

#[async_trait]
impl SourceAdapter for CachedFileAdapter {
    fn source_id(&self) -> &'static str {
        CACHED_FILE_SOURCE_ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cache
    }

    async fn try_fetch(
        &self,
        _http: &HttpFetcher,
        ctx: &AdapterContext,
        criteria: &FetchCriteria,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let cache = UniversityCacheFile::new(&ctx.cache_path);
        if !cache.exists().await {
            debug!(path = %ctx.cache_path.display(), "no cache file yet");
            return Ok(Vec::new());
        }
        let entries = cache.read_raw().await?;
        Ok(entries
            .iter()
            .filter_map(Self::entry_to_raw)
            .filter(|raw| row_matches_country(raw, &criteria.country))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_fields_map_onto_raw_record() {
        let entry = serde_json::json!({
            "name": "McGill University",
            "country": "Canada",
            "city": "Montreal",
            "rank": 30,
            "score": 81.5,
            "rating": 4.1,
            "tuition": 21000.0,
            "sourceUrls": ["https://www.topuniversities.com/universities/mcgill-university"],
            "sources": ["qs-rankings", "the-rankings"]
        });
        let raw = CachedFileAdapter::entry_to_raw(&entry).unwrap();
        assert_eq!(raw.rank.as_deref(), Some("30"));
        assert_eq!(raw.score.as_deref(), Some("81.5"));
        assert_eq!(raw.sources, vec!["qs-rankings", "the-rankings"]);
        assert_eq!(raw.tuition.as_deref(), Some("21000.0"));
        assert_eq!(
            raw.source_url.as_deref(),
            Some("https://www.topuniversities.com/universities/mcgill-university")
        );
    }

    #[test]
    fn stored_rating_never_becomes_a_score() {
        let entry = serde_json::json!({
            "name": "Japan 1 University",
            "country": "Japan",
            "rating": 3.8,
            "sources": ["synthetic"]
        });
        let raw = CachedFileAdapter::entry_to_raw(&entry).unwrap();
        assert!(raw.score.is_none());
        assert_eq!(raw.sources, vec!["synthetic"]);
    }

    #[test]
    fn entries_without_a_name_are_skipped() {
        assert!(CachedFileAdapter::entry_to_raw(&serde_json::json!({"country": "Canada"})).is_none());
        assert!(CachedFileAdapter::entry_to_raw(&serde_json::json!({"name": 12})).is_none());
    }
}
