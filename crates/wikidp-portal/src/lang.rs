//! Preferred / fallback language selection over per-language maps.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreference {
    pub lang: String,
    pub fallback: String,
}

impl LanguagePreference {
    pub fn new(lang: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            fallback: fallback.into(),
        }
    }

    /// The `wikibase:language` list: `"de,en"` when the fallback differs, else `"de"`.
    pub fn wikibase_language(&self) -> String {
        if self.lang == self.fallback {
            self.lang.clone()
        } else {
            format!("{},{}", self.lang, self.fallback)
        }
    }

    /// Value for the preferred language unless it is empty, then the fallback's.
    pub fn pick<'a, T>(
        &self,
        values: &'a BTreeMap<String, T>,
        is_empty: impl Fn(&T) -> bool,
    ) -> Option<&'a T> {
        values
            .get(&self.lang)
            .filter(|v| !is_empty(v))
            .or_else(|| values.get(&self.fallback))
    }
}

impl Default for LanguagePreference {
    fn default() -> Self {
        Self::new("en", "en")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefers_language_then_fallback() {
        let pref = LanguagePreference::new("de", "en");
        let map = labels(&[("de", "Katze"), ("en", "cat")]);
        assert_eq!(pref.pick(&map, String::is_empty).map(String::as_str), Some("Katze"));

        let map = labels(&[("en", "cat")]);
        assert_eq!(pref.pick(&map, String::is_empty).map(String::as_str), Some("cat"));

        let map = labels(&[("de", ""), ("en", "cat")]);
        assert_eq!(pref.pick(&map, String::is_empty).map(String::as_str), Some("cat"));

        let map = labels(&[("fr", "chat")]);
        assert_eq!(pref.pick(&map, String::is_empty), None);
    }

    #[test]
    fn wikibase_language_list() {
        assert_eq!(LanguagePreference::new("de", "en").wikibase_language(), "de,en");
        assert_eq!(LanguagePreference::default().wikibase_language(), "en");
    }
}
