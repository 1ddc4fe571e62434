use scraper::{ElementRef, Html, Selector};
use unirank_core::RawRecord;

use crate::AdapterError;

/// Selectors for one layout of a ranking table. Every field selector is scoped to a row.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub row: &'static str,
    pub name: &'static str,
    pub rank: Option<&'static str>,
    pub country: Option<&'static str>,
    pub location: Option<&'static str>,
    pub score: Option<&'static str>,
    pub link: Option<&'static str>,
}

struct CompiledSelectors {
    row: Selector,
    name: Selector,
    rank: Option<Selector>,
    country: Option<Selector>,
    location: Option<Selector>,
    score: Option<Selector>,
    link: Option<Selector>,
}

pub(crate) fn compile(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn compile_opt(selector: Option<&str>) -> Result<Option<Selector>, AdapterError> {
    selector.map(compile).transpose()
}

impl SelectorSet {
    fn compile(&self) -> Result<CompiledSelectors, AdapterError> {
        Ok(CompiledSelectors {
            row: compile(self.row)?,
            name: compile(self.name)?,
            rank: compile_opt(self.rank)?,
            country: compile_opt(self.country)?,
            location: compile_opt(self.location)?,
            score: compile_opt(self.score)?,
            link: compile_opt(self.link)?,
        })
    }

    /// One raw record per row that has a non-empty name; header rows fall out naturally.
    pub fn extract(&self, document: &Html, origin: &str) -> Result<Vec<RawRecord>, AdapterError> {
        let sel = self.compile()?;
        let mut out = Vec::new();
        for row in document.select(&sel.row) {
            let Some(name) = first_text_in(row, &sel.name) else {
                continue;
            };
            let mut raw = RawRecord::named(name);
            raw.rank = sel.rank.as_ref().and_then(|s| first_text_in(row, s));
            raw.country = sel.country.as_ref().and_then(|s| first_text_in(row, s));
            raw.location = sel.location.as_ref().and_then(|s| first_text_in(row, s));
            raw.score = sel.score.as_ref().and_then(|s| first_text_in(row, s));
            raw.detail_url = sel
                .link
                .as_ref()
                .and_then(|s| first_attr_in(row, s, "href"))
                .map(|href| absolutize_url(origin, &href));
            out.push(raw);
        }
        Ok(out)
    }
}

/// Try `primary`, then `fallback`; an empty result from both is a parse mismatch.
pub(crate) fn extract_with_fallback(
    html: &str,
    origin: &str,
    page_url: &str,
    primary: &SelectorSet,
    fallback: &SelectorSet,
) -> Result<Vec<RawRecord>, AdapterError> {
    let document = Html::parse_document(html);
    let mut rows = primary.extract(&document, origin)?;
    if rows.is_empty() {
        tracing::debug!(url = page_url, "primary selectors matched nothing; trying fallback");
        rows = fallback.extract(&document, origin)?;
    }
    if rows.is_empty() {
        return Err(AdapterError::NoMatches {
            url: page_url.to_string(),
        });
    }
    for raw in &mut rows {
        raw.source_url = Some(page_url.to_string());
    }
    Ok(rows)
}

pub(crate) fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn first_text_in(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

fn first_attr_in(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string()))
}

/// Resolve a possibly relative link against a site origin such as `https://www.usnews.com`.
pub fn absolutize_url(origin: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{}{href}", origin.trim_end_matches('/'))
    } else {
        format!("{}/{href}", origin.trim_end_matches('/'))
    }
}

/// Lowercase path segment with runs of non-alphanumerics collapsed to `-`.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: SelectorSet = SelectorSet {
        row: "table.t tr",
        name: ".n",
        rank: Some(".r"),
        country: None,
        location: Some(".loc"),
        score: None,
        link: Some(".n a"),
    };

    const LIST: SelectorSet = SelectorSet {
        row: "ul.l li",
        name: ".title",
        rank: None,
        country: None,
        location: None,
        score: None,
        link: None,
    };

    #[test]
    fn relative_links_are_resolved_against_origin() {
        assert_eq!(
            absolutize_url("https://www.topuniversities.com", "/universities/mit"),
            "https://www.topuniversities.com/universities/mit"
        );
        assert_eq!(absolutize_url("https://a.com/", "b/c"), "https://a.com/b/c");
        assert_eq!(absolutize_url("https://a.com", "//cdn.a.com/x"), "https://cdn.a.com/x");
        assert_eq!(absolutize_url("https://a.com", "https://b.org/"), "https://b.org/");
    }

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("Computer Science & Information Systems"), "computer-science-information-systems");
        assert_eq!(slugify(" latin america "), "latin-america");
        assert_eq!(slugify("us-canada"), "us-canada");
    }

    #[test]
    fn fallback_runs_only_when_primary_is_empty() {
        let html = r#"<ul class="l"><li><span class="title"> Aalto  University </span></li></ul>"#;
        let rows = extract_with_fallback(html, "https://x.org", "https://x.org/list", &TABLE, &LIST).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Aalto University");
        assert_eq!(rows[0].source_url.as_deref(), Some("https://x.org/list"));
    }

    #[test]
    fn both_layouts_missing_is_no_matches() {
        let err = extract_with_fallback("<p>blocked</p>", "https://x.org", "https://x.org/list", &TABLE, &LIST)
            .unwrap_err();
        assert!(matches!(err, AdapterError::NoMatches { .. }));
    }

    #[test]
    fn header_rows_without_names_are_skipped() {
        let html = r#"<table class="t">
            <tr><th>Rank</th><th>Name</th></tr>
            <tr><td class="r">=3</td><td class="n"><a href="/u/lund">Lund University</a></td><td class="loc">Lund, Sweden</td></tr>
        </table>"#;
        let doc = Html::parse_document(html);
        let rows = TABLE.extract(&doc, "https://x.org").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank.as_deref(), Some("=3"));
        assert_eq!(rows[0].detail_url.as_deref(), Some("https://x.org/u/lund"));
        assert_eq!(rows[0].location.as_deref(), Some("Lund, Sweden"));
    }
}
