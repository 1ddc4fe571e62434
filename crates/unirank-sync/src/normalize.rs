//! Raw adapter output to canonical candidates.

use unirank_core::{
    canonical_country, find_country_in, CandidateUniversity, RawRecord, ScoreScale, UNKNOWN_COUNTRY,
};

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Keep digits and `-`, then read the part before the first `-`. "=28" ⇒ 28, "101-150" ⇒ 101.
pub fn parse_rank(text: &str) -> Option<u32> {
    let kept: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    let head = kept.split('-').next().unwrap_or_default();
    head.parse().ok()
}

/// First decimal number in the text, rescaled onto 0–100.
pub fn parse_score(text: &str, scale: ScoreScale) -> Option<f64> {
    let mut number = String::new();
    let mut seen_dot = false;
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else if ch == '.' && !seen_dot && !number.is_empty() {
            number.push(ch);
            seen_dot = true;
        } else if !number.is_empty() {
            break;
        }
    }
    let value: f64 = number.trim_end_matches('.').parse().ok()?;
    Some(scale.to_percent(value))
}

/// Explicit country (alias-canonicalised) → known country inside the location text → "Unknown".
pub fn resolve_country(country: Option<&str>, location: Option<&str>) -> String {
    if let Some(explicit) = clean(country) {
        return canonical_country(&explicit)
            .map(str::to_string)
            .unwrap_or(explicit);
    }
    location
        .and_then(find_country_in)
        .unwrap_or(UNKNOWN_COUNTRY)
        .to_string()
}

fn parse_amount(text: &str) -> Option<f64> {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

/// `None` when the trimmed name is empty; every other record survives.
pub fn normalize(raw: &RawRecord, source_id: &str, scale: ScoreScale) -> Option<CandidateUniversity> {
    let name = raw.name.trim();
    if name.is_empty() {
        return None;
    }
    let mut candidate = CandidateUniversity::new(
        name,
        resolve_country(raw.country.as_deref(), raw.location.as_deref()),
        source_id,
    );
    candidate.city = clean(raw.city.as_deref());
    candidate.location = clean(raw.location.as_deref());
    candidate.rank = raw.rank.as_deref().and_then(parse_rank);
    candidate.score = raw.score.as_deref().and_then(|s| parse_score(s, scale));
    candidate.website = clean(raw.website.as_deref());
    candidate.image_url = clean(raw.image_url.as_deref());
    candidate.detail_url = clean(raw.detail_url.as_deref());
    candidate.description = clean(raw.description.as_deref());
    candidate.tuition = raw.tuition.as_deref().and_then(parse_amount);
    candidate.majors = clean(raw.majors.as_deref());
    candidate.facilities = clean(raw.facilities.as_deref());
    candidate.source_url = clean(raw.source_url.as_deref());
    candidate.sources = raw.sources.clone();
    Some(candidate)
}

/// Normalize a batch, returning survivors in input order and the number dropped.
pub fn normalize_all(
    raws: &[RawRecord],
    source_id: &str,
    scale: ScoreScale,
) -> (Vec<CandidateUniversity>, usize) {
    let mut dropped = 0;
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        match normalize(raw, source_id, scale) {
            Some(candidate) => out.push(candidate),
            None => {
                dropped += 1;
                tracing::warn!(source_id, "dropping record with empty name");
            }
        }
    }
    (out, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_strip_decorations_and_keep_band_start() {
        assert_eq!(parse_rank("=28"), Some(28));
        assert_eq!(parse_rank("#12"), Some(12));
        assert_eq!(parse_rank("101-150"), Some(101));
        assert_eq!(parse_rank("N/A"), None);
        assert_eq!(parse_rank(""), None);
        assert_eq!(parse_rank("-"), None);
    }

    #[test]
    fn scores_are_rescaled_to_percent() {
        assert_eq!(parse_score("8.5", ScoreScale::OutOfTen), Some(85.0));
        assert_eq!(parse_score("87.3", ScoreScale::Percent), Some(87.3));
        assert_eq!(parse_score("Overall 4.5 / 5", ScoreScale::OutOfFive), Some(90.0));
        assert_eq!(parse_score("-", ScoreScale::Percent), None);
    }

    #[test]
    fn country_falls_back_to_location_then_unknown() {
        assert_eq!(resolve_country(Some("USA"), None), "United States");
        assert_eq!(resolve_country(Some("  Narnia "), None), "Narnia");
        assert_eq!(resolve_country(None, Some("Oxford, United Kingdom")), "United Kingdom");
        assert_eq!(resolve_country(Some(" "), Some("Zurich, Switzerland")), "Switzerland");
        assert_eq!(resolve_country(None, Some("Main Campus")), UNKNOWN_COUNTRY);
        assert_eq!(resolve_country(None, None), UNKNOWN_COUNTRY);
    }

    #[test]
    fn blank_names_are_dropped() {
        let raws = vec![RawRecord::named(""), RawRecord::named("   "), RawRecord::named(" MIT ")];
        let (candidates, dropped) = normalize_all(&raws, "qs-rankings", ScoreScale::Percent);
        assert_eq!(dropped, 2);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "MIT");
        assert_eq!(candidates[0].country, UNKNOWN_COUNTRY);
    }

    #[test]
    fn empty_optional_strings_become_absent() {
        let mut raw = RawRecord::named("Kyoto University");
        raw.website = Some("  ".to_string());
        raw.rank = Some("46".to_string());
        raw.tuition = Some("$21,000".to_string());
        let candidate = normalize(&raw, "qs-rankings", ScoreScale::Percent).unwrap();
        assert!(candidate.website.is_none());
        assert_eq!(candidate.rank, Some(46));
        assert_eq!(candidate.tuition, Some(21000.0));
        assert_eq!(candidate.source_id, "qs-rankings");
    }
}
