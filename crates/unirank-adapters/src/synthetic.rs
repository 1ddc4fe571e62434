use async_trait::async_trait;
use rand::Rng;
use unirank_core::{canonical_country, FetchCriteria, RankingType, RawRecord};
use unirank_storage::HttpFetcher;

use crate::html::slugify;
use crate::qs::QS_ORIGIN;
use crate::{AdapterContext, AdapterError, SourceAdapter, SourceKind, SYNTHETIC_RANKINGS_SOURCE_ID};

struct Institution {
    name: &'static str,
    country: &'static str,
    city: &'static str,
    website: &'static str,
    base_score: f64,
}

const fn inst(
    name: &'static str,
    country: &'static str,
    city: &'static str,
    website: &'static str,
    base_score: f64,
) -> Institution {
    Institution {
        name,
        country,
        city,
        website,
        base_score,
    }
}

const INSTITUTIONS: &[Institution] = &[
    inst("Massachusetts Institute of Technology", "United States", "Cambridge", "https://www.mit.edu/", 100.0),
    inst("Stanford University", "United States", "Stanford", "https://www.stanford.edu/", 98.7),
    inst("Harvard University", "United States", "Cambridge", "https://www.harvard.edu/", 98.5),
    inst("University of Oxford", "United Kingdom", "Oxford", "https://www.ox.ac.uk/", 98.4),
    inst("University of Cambridge", "United Kingdom", "Cambridge", "https://www.cam.ac.uk/", 98.2),
    inst("California Institute of Technology", "United States", "Pasadena", "https://www.caltech.edu/", 97.9),
    inst("Imperial College London", "United Kingdom", "London", "https://www.imperial.ac.uk/", 97.4),
    inst("ETH Zurich", "Switzerland", "Zurich", "https://ethz.ch/", 96.9),
    inst("University of Chicago", "United States", "Chicago", "https://www.uchicago.edu/", 96.8),
    inst("University College London", "United Kingdom", "London", "https://www.ucl.ac.uk/", 96.4),
    inst("National University of Singapore", "Singapore", "Singapore", "https://nus.edu.sg/", 96.1),
    inst("Princeton University", "United States", "Princeton", "https://www.princeton.edu/", 95.9),
    inst("University of Tokyo", "Japan", "Tokyo", "https://www.u-tokyo.ac.jp/", 95.5),
    inst("University of Toronto", "Canada", "Toronto", "https://www.utoronto.ca/", 95.2),
    inst("University of Melbourne", "Australia", "Melbourne", "https://www.unimelb.edu.au/", 94.8),
    inst("Kyoto University", "Japan", "Kyoto", "https://www.kyoto-u.ac.jp/", 94.5),
    inst("Peking University", "China", "Beijing", "https://www.pku.edu.cn/", 94.3),
    inst("Tsinghua University", "China", "Beijing", "https://www.tsinghua.edu.cn/", 94.1),
    inst("Fudan University", "China", "Shanghai", "https://www.fudan.edu.cn/", 93.7),
    inst("Seoul National University", "South Korea", "Seoul", "https://www.snu.ac.kr/", 93.4),
    inst("University of Hong Kong", "Hong Kong", "Hong Kong", "https://www.hku.hk/", 93.2),
    inst("National Taiwan University", "Taiwan", "Taipei", "https://www.ntu.edu.tw/", 92.8),
    inst("Lomonosov Moscow State University", "Russia", "Moscow", "https://www.msu.ru/", 92.3),
    inst("Humboldt University of Berlin", "Germany", "Berlin", "https://www.hu-berlin.de/", 92.1),
    inst("Heidelberg University", "Germany", "Heidelberg", "https://www.uni-heidelberg.de/", 91.9),
    inst("Ecole Normale Superieure Paris", "France", "Paris", "https://www.ens.psl.eu/", 91.7),
    inst("University of Manchester", "United Kingdom", "Manchester", "https://www.manchester.ac.uk/", 91.4),
    inst("University of Amsterdam", "Netherlands", "Amsterdam", "https://www.uva.nl/", 91.2),
    inst("University of Warwick", "United Kingdom", "Coventry", "https://warwick.ac.uk/", 90.8),
    inst("University of Sydney", "Australia", "Sydney", "https://www.sydney.edu.au/", 90.5),
];

fn region_countries(region: &str) -> &'static [&'static str] {
    match slugify(region).as_str() {
        "asia" => &["China", "Japan", "Singapore", "Hong Kong", "Taiwan", "South Korea"],
        "europe" => &["United Kingdom", "Germany", "France", "Netherlands", "Switzerland"],
        "us-canada" => &["United States", "Canada"],
        "latin-america" => &["Brazil", "Chile", "Mexico", "Argentina"],
        "australia-new-zealand" => &["Australia", "New Zealand"],
        "brics" => &["China", "Russia", "India", "Brazil", "South Africa"],
        _ => &[],
    }
}

fn subject_adjustment(subject: &str, institution: &str) -> f64 {
    let table: &[(&str, f64)] = match slugify(subject).as_str() {
        "computer-science" => &[
            ("Massachusetts Institute of Technology", 3.0),
            ("Stanford University", 2.0),
            ("University of Cambridge", 1.0),
            ("University of Tokyo", -1.0),
        ],
        "engineering" => &[
            ("California Institute of Technology", 3.0),
            ("ETH Zurich", 2.0),
            ("Imperial College London", 1.0),
        ],
        "medicine" => &[
            ("Harvard University", 3.0),
            ("University of Oxford", 2.0),
            ("University College London", 1.0),
        ],
        "business-and-management" | "business" => &[
            ("University of Chicago", 3.0),
            ("Princeton University", 2.0),
            ("University of Hong Kong", 1.0),
        ],
        "law" => &[
            ("Harvard University", 3.0),
            ("University of Oxford", 2.0),
            ("Peking University", 1.0),
        ],
        _ => &[],
    };
    table
        .iter()
        .find(|(name, _)| *name == institution)
        .map_or(0.0, |(_, delta)| *delta)
}

/// Deterministic table of well-known institutions with a small random score jitter.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticRankingsAdapter {
    pub jitter: bool,
}

impl Default for SyntheticRankingsAdapter {
    fn default() -> Self {
        Self { jitter: true }
    }
}

impl SyntheticRankingsAdapter {
    pub fn without_jitter() -> Self {
        Self { jitter: false }
    }

    /// Ranked table for the criteria's ranking type, restricted to the criteria's country.
    pub fn generate<R: Rng + ?Sized>(&self, criteria: &FetchCriteria, rng: &mut R) -> Vec<RawRecord> {
        let region_filter = match (criteria.ranking_type, criteria.region.as_deref()) {
            (RankingType::Region, Some(region)) => Some(region_countries(region)),
            _ => None,
        };
        let subject = match criteria.ranking_type {
            RankingType::Subject => criteria.subject.as_deref(),
            _ => None,
        };

        let mut scored: Vec<(&Institution, f64)> = INSTITUTIONS
            .iter()
            .filter(|i| region_filter.map_or(true, |countries| countries.contains(&i.country)))
            .map(|i| {
                let adjusted = i.base_score + subject.map_or(0.0, |s| subject_adjustment(s, i.name));
                (i, adjusted)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let wanted = canonical_country(&criteria.country).unwrap_or(criteria.country.trim());
        let mut out = Vec::new();
        for (index, (institution, score)) in scored.into_iter().enumerate() {
            if !institution.country.eq_ignore_ascii_case(wanted) {
                continue;
            }
            let offset = if self.jitter { rng.random_range(-1.0..=1.0) } else { 0.0 };
            let mut raw = RawRecord::named(institution.name);
            raw.rank = Some((index + 1).to_string());
            raw.score = Some(format!("{:.1}", (score + offset).clamp(0.0, 100.0)));
            raw.country = Some(institution.country.to_string());
            raw.city = Some(institution.city.to_string());
            raw.website = Some(institution.website.to_string());
            raw.detail_url = Some(format!("{QS_ORIGIN}/universities/{}", slugify(institution.name)));
            out.push(raw);
        }
        out
    }
}

#[async_trait]
impl SourceAdapter for SyntheticRankingsAdapter {
    fn source_id(&self) -> &'static str {
        SYNTHETIC_RANKINGS_SOURCE_ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    async fn try_fetch(
        &self,
        _http: &HttpFetcher,
        _ctx: &AdapterContext,
        criteria: &FetchCriteria,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        Ok(self.generate(criteria, &mut rand::rng()))
    }
}
