//! Small text helpers used when rendering entities as HTML.

use wikidp_sparql::IdPatterns;

/// Form encoding: unreserved characters kept, spaces as `+`, the rest percent-encoded.
pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).replace("%20", "+")
}

/// Tag attributes picked up by the client-side label loader.
pub fn qlabel_attributes(url: &str) -> String {
    format!("class=qlabel its-ta-ident-ref={url}")
}

pub fn entity_url(ids: &IdPatterns, entity_id: &str) -> String {
    ids.entity_url(entity_id)
}
