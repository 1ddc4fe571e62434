//! Known-country table used for country resolution and synthetic generation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownCountry {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub web_suffix: &'static str,
}

// Hong Kong precedes China so "Hong Kong SAR, China" resolves to the narrower match.
pub const KNOWN_COUNTRIES: &[KnownCountry] = &[
    KnownCountry { name: "United States", aliases: &["USA", "US", "U.S.", "U.S.A.", "United States of America"], web_suffix: "edu" },
    KnownCountry { name: "United Kingdom", aliases: &["UK", "U.K.", "Great Britain", "Britain", "England", "Scotland"], web_suffix: "ac.uk" },
    KnownCountry { name: "Canada", aliases: &[], web_suffix: "ca" },
    KnownCountry { name: "Australia", aliases: &[], web_suffix: "edu.au" },
    KnownCountry { name: "Hong Kong", aliases: &["Hong Kong SAR", "HK"], web_suffix: "edu.hk" },
    KnownCountry { name: "China", aliases: &["Mainland China", "PRC", "People's Republic of China"], web_suffix: "edu.cn" },
    KnownCountry { name: "Taiwan", aliases: &[], web_suffix: "edu.tw" },
    KnownCountry { name: "Japan", aliases: &[], web_suffix: "ac.jp" },
    KnownCountry { name: "Singapore", aliases: &[], web_suffix: "edu.sg" },
    KnownCountry { name: "South Korea", aliases: &["Korea", "Republic of Korea", "Korea, South"], web_suffix: "ac.kr" },
    KnownCountry { name: "Germany", aliases: &["Deutschland"], web_suffix: "de" },
    KnownCountry { name: "France", aliases: &[], web_suffix: "fr" },
    KnownCountry { name: "Switzerland", aliases: &[], web_suffix: "ch" },
    KnownCountry { name: "Netherlands", aliases: &["The Netherlands", "Holland"], web_suffix: "nl" },
    KnownCountry { name: "Sweden", aliases: &[], web_suffix: "se" },
    KnownCountry { name: "New Zealand", aliases: &[], web_suffix: "ac.nz" },
    KnownCountry { name: "Italy", aliases: &[], web_suffix: "it" },
    KnownCountry { name: "Spain", aliases: &[], web_suffix: "es" },
    KnownCountry { name: "Ireland", aliases: &[], web_suffix: "ie" },
    KnownCountry { name: "Denmark", aliases: &[], web_suffix: "dk" },
    KnownCountry { name: "Norway", aliases: &[], web_suffix: "no" },
    KnownCountry { name: "Finland", aliases: &[], web_suffix: "fi" },
    KnownCountry { name: "Belgium", aliases: &[], web_suffix: "be" },
    KnownCountry { name: "Austria", aliases: &[], web_suffix: "at" },
    KnownCountry { name: "Russia", aliases: &["Russian Federation"], web_suffix: "ru" },
    KnownCountry { name: "India", aliases: &[], web_suffix: "ac.in" },
    KnownCountry { name: "Brazil", aliases: &[], web_suffix: "br" },
    KnownCountry { name: "Chile", aliases: &[], web_suffix: "cl" },
    KnownCountry { name: "Mexico", aliases: &[], web_suffix: "mx" },
    KnownCountry { name: "Argentina", aliases: &[], web_suffix: "ar" },
    KnownCountry { name: "South Africa", aliases: &[], web_suffix: "ac.za" },
];

impl KnownCountry {
    fn spellings(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

pub fn lookup_country(name: &str) -> Option<&'static KnownCountry> {
    let needle = name.trim();
    KNOWN_COUNTRIES
        .iter()
        .find(|c| c.spellings().any(|s| s.eq_ignore_ascii_case(needle)))
}

/// Canonical spelling for an explicit country value, if it is a known name or alias.
pub fn canonical_country(name: &str) -> Option<&'static str> {
    lookup_country(name).map(|c| c.name)
}

/// First known country mentioned as a whole word inside free text.
pub fn find_country_in(text: &str) -> Option<&'static str> {
    let haystack = text.to_lowercase();
    KNOWN_COUNTRIES
        .iter()
        .find(|c| c.spellings().any(|s| contains_word(&haystack, &s.to_lowercase())))
        .map(|c| c.name)
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
