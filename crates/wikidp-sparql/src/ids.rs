//! Item / property identifiers.
//!
//! Identifiers are located with configurable regexes (the portal config
//! carries them as strings) rather than strict parsing: `"wd:P31"` and
//! `"http://www.wikidata.org/prop/direct/P31"` both yield `P31`.

use regex::Regex;

pub const ITEM_REGEX: &str = r"(Q|q)\d+";
pub const PROPERTY_REGEX: &str = r"(P|p)\d+";
/// PRONOM identifiers such as `fmt/43` or `x-fmt/392`.
pub const PUID_REGEX: &str = r"[x-]?fmt/\d+";
pub const ENTITY_URL_PATTERN: &str = "http://www.wikidata.org/entity/$1";
pub const ENTITY_URI_PREFIX: &str = "http://www.wikidata.org/entity/";
pub const WIKIDATA_ENTITY_BASE_URL: &str = "https://www.wikidata.org/wiki";

#[derive(Debug, Clone)]
pub struct IdPatterns {
    item: Regex,
    property: Regex,
    item_whole: Regex,
    property_whole: Regex,
    puid: Regex,
}

impl IdPatterns {
    pub fn new(item_regex: &str, property_regex: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            item: Regex::new(item_regex)?,
            property: Regex::new(property_regex)?,
            item_whole: Regex::new(&format!("^(?:{item_regex})$"))?,
            property_whole: Regex::new(&format!("^(?:{property_regex})$"))?,
            puid: Regex::new(PUID_REGEX)?,
        })
    }

    /// First property id found anywhere in `input`.
    pub fn pid_from_str(&self, input: &str) -> Option<String> {
        self.property.find(input).map(|m| m.as_str().to_string())
    }

    /// First item id found anywhere in `input`.
    pub fn qid_from_str(&self, input: &str) -> Option<String> {
        self.item.find(input).map(|m| m.as_str().to_string())
    }

    /// True when the whole of `input` is an item id (route matching).
    pub fn is_item(&self, input: &str) -> bool {
        self.item_whole.is_match(input)
    }

    pub fn is_property(&self, input: &str) -> bool {
        self.property_whole.is_match(input)
    }

    /// True when a search string contains a PUID.
    pub fn mentions_puid(&self, input: &str) -> bool {
        self.puid.is_match(input)
    }

    /// Entity URL for an item or property id embedded in `input`, `#` otherwise.
    pub fn entity_url(&self, input: &str) -> String {
        match self.qid_from_str(input).or_else(|| self.pid_from_str(input)) {
            Some(id) => ENTITY_URL_PATTERN.replace("$1", &id),
            None => "#".to_string(),
        }
    }
}

impl Default for IdPatterns {
    fn default() -> Self {
        // Both patterns are constants known to compile.
        Self::new(ITEM_REGEX, PROPERTY_REGEX).unwrap_or_else(|e| panic!("builtin id regex: {e}"))
    }
}

/// Numeric part of an entity id: `P31` -> 31. Only digits may follow the prefix.
pub fn entity_id_to_int(entity: &str) -> Option<u64> {
    let digits = entity.get(1..)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_item_url(qid: &str) -> String {
    format!("{WIKIDATA_ENTITY_BASE_URL}/{qid}")
}

/// Strip the concept URI prefix from a SPARQL binding: `http://www.wikidata.org/entity/Q42` -> `Q42`.
pub fn strip_entity_uri(uri: &str) -> String {
    uri.strip_prefix(ENTITY_URI_PREFIX).unwrap_or(uri).to_string()
}

/// Render a `VALUES` body: `["P31", "P5"]` -> `(wd:P31)(wd:P5)`.
pub fn values_clause<S: AsRef<str>>(ids: &[S]) -> String {
    ids.iter()
        .map(|id| format!("(wd:{})", id.as_ref()))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finds_ids_inside_longer_strings() {
        let ids = IdPatterns::default();
        assert_eq!(
            ids.pid_from_str("http://www.wikidata.org/prop/direct/P1163"),
            Some("P1163".to_string())
        );
        assert_eq!(ids.qid_from_str("wd:q42"), Some("q42".to_string()));
        assert_eq!(ids.pid_from_str("no identifier"), None);
    }

    #[test]
    fn whole_segment_matching() {
        let ids = IdPatterns::default();
        assert!(ids.is_item("Q42"));
        assert!(ids.is_item("q42"));
        assert!(!ids.is_item("Q42x"));
        assert!(!ids.is_item("search"));
        assert!(ids.is_property("P31"));
        assert!(!ids.is_property("Q31"));
    }

    #[test]
    fn detects_puids_in_search_text() {
        let ids = IdPatterns::default();
        assert!(ids.mentions_puid("fmt/43"));
        assert!(ids.mentions_puid("x-fmt/392"));
        assert!(ids.mentions_puid("jpeg fmt/44"));
        assert!(!ids.mentions_puid("jpeg"));
    }

    #[test]
    fn entity_url_filter() {
        let ids = IdPatterns::default();
        assert_eq!(ids.entity_url("Q42"), "http://www.wikidata.org/entity/Q42");
        assert_eq!(ids.entity_url("P31"), "http://www.wikidata.org/entity/P31");
        assert_eq!(ids.entity_url("nothing"), "#");
    }

    #[test]
    fn values_clause_matches_sparql_syntax() {
        assert_eq!(values_clause(&["P31", "P5", "P123"]), "(wd:P31)(wd:P5)(wd:P123)");
        assert_eq!(values_clause::<&str>(&[]), "");
    }

    #[test]
    fn strips_entity_prefix() {
        assert_eq!(strip_entity_uri("http://www.wikidata.org/entity/Q235557"), "Q235557");
        assert_eq!(strip_entity_uri("Q1"), "Q1");
    }

    proptest! {
        #[test]
        fn numeric_part_round_trips(n in 0u64..10_000_000) {
            prop_assert_eq!(entity_id_to_int(&format!("P{n}")), Some(n));
            prop_assert_eq!(entity_id_to_int(&format!("Q{n}")), Some(n));
            prop_assert_eq!(entity_id_to_int(&format!("Q+{n}")), None);
            prop_assert_eq!(entity_id_to_int(&format!("Q {n}")), None);
        }

        #[test]
        fn generated_pids_are_recognised(n in 1u64..10_000_000) {
            let ids = IdPatterns::default();
            let pid = format!("P{n}");
            prop_assert!(ids.is_property(&pid));
            prop_assert_eq!(ids.pid_from_str(&format!("wd:{pid}")), Some(pid));
        }
    }
}
