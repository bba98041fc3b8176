//! Parametrized SPARQL queries.
//!
//! Queries are written readably here and flattened to a single line before
//! use. Placeholders follow the `$name` / `${name}` convention; `$$` is a
//! literal dollar sign.

use crate::error::{Result, SparqlError};

/// Collapse every whitespace run to a single space.
pub fn flatten_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    text: String,
}

impl QueryTemplate {
    pub fn new(text: &str) -> Self {
        Self {
            text: flatten_query(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fill every placeholder; an unfilled one is an error.
    pub fn substitute(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut chars = self.text.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek().map(|(_, n)| *n) {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(SparqlError::Template(name));
                    }
                    out.push_str(lookup(params, &name)?);
                }
                Some(n) if is_ident_start(n) => {
                    let mut name = String::new();
                    while let Some((_, n)) = chars.peek() {
                        if is_ident_char(*n) {
                            name.push(*n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(lookup(params, &name)?);
                }
                _ => out.push('$'),
            }
        }

        Ok(out)
    }
}

fn lookup<'a>(params: &[(&str, &'a str)], name: &str) -> Result<&'a str> {
    params
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| SparqlError::Template(name.to_string()))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ============================================================================
// Registered queries
// ============================================================================

/// Details (label, description, datatype, formatter URL) for a `VALUES` list of properties.
pub const PROPERTY_QUERY: &str = r#"
SELECT ?property ?id ?propertyType ?propertyLabel ?propertyDescription
       (SAMPLE(?formatterUrl) AS ?formatter_url)
WHERE {
  VALUES (?property) { $values }
  ?property wikibase:propertyType ?propertyType .
  OPTIONAL { ?property wdt:P1630 ?formatterUrl . }
  BIND(STRAFTER(STR(?property), "http://www.wikidata.org/entity/") AS ?id)
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
GROUP BY ?property ?id ?propertyType ?propertyLabel ?propertyDescription
"#;

/// Qualifiers allowed by the "allowed qualifiers" constraint (Q21510851) of a property.
pub const PROPERTY_ALLOWED_QUALIFIERS: &str = r#"
SELECT DISTINCT ?property ?id ?propertyLabel ?propertyDescription
WHERE {
  VALUES (?subject) { $values }
  ?subject p:P2302 ?constraint .
  ?constraint ps:P2302 wd:Q21510851 ;
              pq:P2306 ?property .
  BIND(STRAFTER(STR(?property), "http://www.wikidata.org/entity/") AS ?id)
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
"#;

/// Properties that are instances of "Wikidata qualifier" (Q15720608).
pub const ALL_QUALIFIER_PROPERTIES: &str = r#"
SELECT DISTINCT ?property ?id ?propertyLabel ?propertyDescription
WHERE {
  ?property wdt:P31/wdt:P279* wd:Q15720608 .
  BIND(STRAFTER(STR(?property), "http://www.wikidata.org/entity/") AS ?id)
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
"#;

/// Properties to indicate a source (Q18608359).
pub const ALL_REFERENCE_PROPERTIES: &str = r#"
SELECT DISTINCT ?property ?id ?propertyLabel ?propertyDescription
WHERE {
  ?property wdt:P31/wdt:P279* wd:Q18608359 .
  BIND(STRAFTER(STR(?property), "http://www.wikidata.org/entity/") AS ?id)
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
"#;

/// Every language with a Wikimedia language code (P424).
pub const ALL_LANGUAGES_QUERY: &str = r#"
SELECT DISTINCT ?item ?code ?itemLabel ?label ?display
WHERE {
  ?item wdt:P424 ?code .
  ?item wdt:P31/wdt:P279* wd:Q34770 .
  OPTIONAL { ?item rdfs:label ?label . FILTER(LANG(?label) = ?code) }
  BIND(CONCAT("{{#language:", ?code, "}}") AS ?display)
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
ORDER BY ?code
"#;

/// Instances of "file format" (Q235557) with their media types.
pub const LIST_FORMATS_QUERY: &str = r#"
SELECT ?idFileFormat ?idFileFormatLabel
       (GROUP_CONCAT(DISTINCT ?mediaType; SEPARATOR="|") AS ?mediaTypes)
WHERE {
  ?idFileFormat wdt:P31 wd:Q235557 .
  OPTIONAL { ?idFileFormat wdt:P1163 ?mediaType . }
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
}
GROUP BY ?idFileFormat ?idFileFormatLabel
ORDER BY ?idFileFormatLabel
"#;

/// Formats with a PRONOM PUID (P2748), narrowed by a `VALUES` clause on `?puid` or `?mime`.
pub const PUID_SEARCH_QUERY: &str = r#"
SELECT DISTINCT ?format ?formatLabel ?formatDescription ?mime ?puid
WHERE {
  ?format wdt:P2748 ?puid .
  OPTIONAL { ?format wdt:P1163 ?mime . }
  SERVICE wikibase:label { bd:serviceParam wikibase:language "$language" . }
  $values
}
"#;
