//! University profile pages reached through a listing row's detail link.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use unirank_storage::HttpFetcher;

use crate::html::{compile, text_or_none};
use crate::qs::QS_ORIGIN;
use crate::{fetch_page, AdapterContext, AdapterError, QS_SOURCE_ID};

/// Primary selector first; the fallback is consulted per field when the primary finds nothing.
#[derive(Debug, Clone, Copy)]
struct FieldSelectors {
    primary: &'static str,
    fallback: &'static str,
}

const NAME: FieldSelectors = FieldSelectors {
    primary: ".uni-profile-name",
    fallback: ".page-title",
};
const DESCRIPTION: FieldSelectors = FieldSelectors {
    primary: ".about-university p",
    fallback: ".description",
};
const LOCATION: FieldSelectors = FieldSelectors {
    primary: ".location",
    fallback: ".country",
};
const WEBSITE: FieldSelectors = FieldSelectors {
    primary: ".website-link a",
    fallback: ".web-link a",
};
const SCORE_ITEM: &str = ".indicator-score, .score-item";
const SCORE_LABEL: &str = ".ind-name, .score-label";
const SCORE_VALUE: &str = ".ind-score, .score-value";
const FACILITY: &str = ".facilities li, .features li";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UniversityDetails {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    /// Indicator label to value; unparseable values are kept as absent.
    pub scores: BTreeMap<String, Option<f64>>,
    pub facilities: Vec<String>,
}

impl UniversityDetails {
    /// Stand-in profile served when a page cannot be scraped.
    pub fn reference() -> Self {
        let scores = [
            ("Academic Reputation", 100.0),
            ("Employer Reputation", 97.5),
            ("Faculty Student Ratio", 95.8),
            ("International Faculty Ratio", 92.3),
            ("International Student Ratio", 91.0),
            ("Citations per Faculty", 99.5),
            ("International Research Network", 94.8),
        ]
        .into_iter()
        .map(|(label, value)| (label.to_string(), Some(value)))
        .collect();
        Self {
            name: Some("Massachusetts Institute of Technology".to_string()),
            description: Some(
                "MIT is a private research university in Cambridge, Massachusetts, known for engineering, \
                 computer science and the physical sciences."
                    .to_string(),
            ),
            location: Some("Cambridge, Massachusetts, United States".to_string()),
            website: Some("https://www.mit.edu/".to_string()),
            scores,
            facilities: [
                "Research laboratories",
                "24-hour library",
                "Sports facilities",
                "Entrepreneurship centre",
                "Art studios",
                "International student services",
                "Career development centre",
                "Health services",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.website.is_none()
            && self.scores.is_empty()
            && self.facilities.is_empty()
    }
}

/// Only topuniversities.com profiles have a known layout.
pub fn is_scrapable_detail_url(url: &str) -> bool {
    url.contains("topuniversities.com")
}

fn all_text(document: &Html, selector: &Selector) -> Option<String> {
    text_or_none(
        document
            .select(selector)
            .map(|n| n.text().collect::<String>())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn text_field(document: &Html, field: FieldSelectors) -> Result<Option<String>, AdapterError> {
    let primary = all_text(document, &compile(field.primary)?);
    match primary {
        Some(text) => Ok(Some(text)),
        None => Ok(all_text(document, &compile(field.fallback)?)),
    }
}

fn href_field(document: &Html, field: FieldSelectors) -> Result<Option<String>, AdapterError> {
    for selector in [field.primary, field.fallback] {
        let sel = compile(selector)?;
        let href = document
            .select(&sel)
            .next()
            .and_then(|n| n.value().attr("href"))
            .and_then(|s| text_or_none(s.to_string()));
        if href.is_some() {
            return Ok(href);
        }
    }
    Ok(None)
}

fn leading_number(text: &str) -> Option<f64> {
    let number: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    number.parse().ok()
}

fn scoped_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    text_or_none(
        element
            .select(selector)
            .map(|n| n.text().collect::<String>())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

pub fn parse_detail_page(html: &str) -> Result<UniversityDetails, AdapterError> {
    let document = Html::parse_document(html);

    let item = compile(SCORE_ITEM)?;
    let label = compile(SCORE_LABEL)?;
    let value = compile(SCORE_VALUE)?;
    let mut scores = BTreeMap::new();
    for element in document.select(&item) {
        if let Some(category) = scoped_text(element, &label) {
            let score = scoped_text(element, &value).as_deref().and_then(leading_number);
            scores.insert(category, score);
        }
    }

    let facility = compile(FACILITY)?;
    let facilities = document
        .select(&facility)
        .filter_map(|n| text_or_none(n.text().collect::<String>()))
        .collect();

    Ok(UniversityDetails {
        name: text_field(&document, NAME)?,
        description: text_field(&document, DESCRIPTION)?,
        location: text_field(&document, LOCATION)?,
        website: href_field(&document, WEBSITE)?,
        scores,
        facilities,
    })
}

/// `None` for links outside topuniversities.com; fetch and selector errors propagate.
pub async fn fetch_university_details(
    http: &HttpFetcher,
    ctx: &AdapterContext,
    url: &str,
) -> Result<Option<UniversityDetails>, AdapterError> {
    if !is_scrapable_detail_url(url) {
        return Ok(None);
    }
    let url = crate::absolutize_url(QS_ORIGIN, url);
    let html = fetch_page(http, ctx, QS_SOURCE_ID, &url).await?;
    parse_detail_page(&html).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_selectors_fill_fields_independently() {
        let html = r#"<html><body>
            <h1 class="page-title"> Lund University </h1>
            <div class="about-university"><p>Founded in 1666.</p><p>Sweden's largest.</p></div>
            <span class="country">Sweden</span>
            <div class="web-link"><a href="https://www.lunduniversity.lu.se">site</a></div>
            <div class="score-item"><span class="score-label">Citations</span><span class="score-value">88.1</span></div>
            <div class="score-item"><span class="score-label">Employer Reputation</span><span class="score-value">-</span></div>
            <ul class="features"><li>Library</li><li> </li></ul>
        </body></html>"#;
        let details = parse_detail_page(html).unwrap();
        assert_eq!(details.name.as_deref(), Some("Lund University"));
        assert_eq!(details.description.as_deref(), Some("Founded in 1666. Sweden's largest."));
        assert_eq!(details.location.as_deref(), Some("Sweden"));
        assert_eq!(details.website.as_deref(), Some("https://www.lunduniversity.lu.se"));
        assert_eq!(details.scores.get("Citations"), Some(&Some(88.1)));
        assert_eq!(details.scores.get("Employer Reputation"), Some(&None));
        assert_eq!(details.facilities, vec!["Library"]);
    }

    #[test]
    fn blank_page_yields_empty_details() {
        assert!(parse_detail_page("<p>nothing here</p>").unwrap().is_empty());
        assert!(!UniversityDetails::reference().is_empty());
    }

    #[test]
    fn only_topuniversities_links_are_scraped() {
        assert!(is_scrapable_detail_url("https://www.topuniversities.com/universities/kyoto-university"));
        assert!(!is_scrapable_detail_url("https://www.usnews.com/best-colleges/mit-2178"));
    }
}
