//! Optional pass that follows topuniversities.com profile links and fills gaps in candidates.

use tracing::{debug, warn};
use unirank_adapters::{fetch_university_details, is_scrapable_detail_url, AdapterContext, UniversityDetails};
use unirank_core::CandidateUniversity;
use unirank_storage::{DelayPolicy, HttpFetcher};

/// Fill-if-absent; values already on the candidate win. Returns whether anything changed.
pub fn apply_details(candidate: &mut CandidateUniversity, details: &UniversityDetails) -> bool {
    let mut changed = false;
    let mut fill = |slot: &mut Option<String>, value: Option<&String>| {
        if slot.is_none() {
            if let Some(value) = value {
                *slot = Some(value.clone());
                changed = true;
            }
        }
    };
    fill(&mut candidate.description, details.description.as_ref());
    fill(&mut candidate.website, details.website.as_ref());
    fill(&mut candidate.location, details.location.as_ref());
    let facilities = (!details.facilities.is_empty()).then(|| details.facilities.join(", "));
    fill(&mut candidate.facilities, facilities.as_ref());
    changed
}

pub struct DetailEnricher<'a> {
    http: &'a HttpFetcher,
    ctx: &'a AdapterContext,
    delay: DelayPolicy,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(http: &'a HttpFetcher, ctx: &'a AdapterContext, delay: DelayPolicy) -> Self {
        Self { http, ctx, delay }
    }

    /// Sequential, pausing between page loads. Failures leave the candidate untouched.
    pub async fn enrich(&self, candidates: &mut [CandidateUniversity]) -> usize {
        let mut enriched = 0;
        let mut fetched_any = false;
        for candidate in candidates.iter_mut() {
            let Some(url) = candidate.detail_url.clone().filter(|u| is_scrapable_detail_url(u)) else {
                continue;
            };
            if fetched_any && !self.delay.is_zero() {
                self.delay.pause().await;
            }
            fetched_any = true;
            match fetch_university_details(self.http, self.ctx, &url).await {
                Ok(Some(details)) => {
                    if apply_details(candidate, &details) {
                        enriched += 1;
                    }
                }
                Ok(None) => debug!(url = %url, "detail link not scrapable"),
                Err(err) => warn!(url = %url, error = %err, "detail page fetch failed; keeping listing data"),
            }
        }
        enriched
    }
}
