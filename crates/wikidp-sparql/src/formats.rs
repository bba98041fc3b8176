//! File-format lookups: the format catalogue and PUID / MIME search.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::{get_value, process_query, sparql_literal, Row, SparqlEndpoint};
use crate::error::Result;
use crate::ids::strip_entity_uri;
use crate::templates::{QueryTemplate, LIST_FORMATS_QUERY, PUID_SEARCH_QUERY};

/// A file format item plus its media types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    pub qid: String,
    pub name: String,
    pub media_types: Vec<String>,
}

impl FileFormat {
    pub fn list_formats(endpoint: &dyn SparqlEndpoint, lang: &str) -> Result<Vec<Self>> {
        let query = QueryTemplate::new(LIST_FORMATS_QUERY).substitute(&[("language", lang)])?;
        let rows = process_query(endpoint, &query)?;
        Ok(rows.iter().map(Self::from_row).collect())
    }

    fn from_row(row: &Row) -> Self {
        let media_types = get_value(row, "mediaTypes", "")
            .split('|')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            qid: strip_entity_uri(get_value(row, "idFileFormat", "")),
            name: get_value(row, "idFileFormatLabel", "").to_string(),
            media_types,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileFormat : [qid={}, name={}, media_types=[{}]]",
            self.qid,
            self.name,
            self.media_types.join("|")
        )
    }
}

/// One hit of a PUID or MIME search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuidSearchResult {
    pub format: String,
    pub label: String,
    pub description: String,
    pub mime: String,
    pub puid: String,
}

impl PuidSearchResult {
    pub fn search_puid(endpoint: &dyn SparqlEndpoint, puid: &str, lang: &str) -> Result<Vec<Self>> {
        let values = format!("VALUES ?puid {{ {} }}", sparql_literal(puid));
        Self::run(endpoint, &values, lang)
    }

    pub fn search_mime(endpoint: &dyn SparqlEndpoint, mime: &str, lang: &str) -> Result<Vec<Self>> {
        let values = format!("VALUES ?mime {{ {} }}", sparql_literal(mime));
        Self::run(endpoint, &values, lang)
    }

    fn run(endpoint: &dyn SparqlEndpoint, values: &str, lang: &str) -> Result<Vec<Self>> {
        let query = QueryTemplate::new(PUID_SEARCH_QUERY)
            .substitute(&[("values", values), ("language", lang)])?;
        let rows = process_query(endpoint, &query)?;
        tracing::debug!(hits = rows.len(), "PUID search finished");
        Ok(rows.iter().map(Self::from_row).collect())
    }

    fn from_row(row: &Row) -> Self {
        Self {
            format: strip_entity_uri(get_value(row, "format", "")),
            label: get_value(row, "formatLabel", "").to_string(),
            description: get_value(row, "formatDescription", "").to_string(),
            mime: get_value(row, "mime", "unknown").to_string(),
            puid: get_value(row, "puid", "").to_string(),
        }
    }
}

impl fmt::Display for PuidSearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PuidSearchResult : [format={}, label={}, MIME={}, puid={}]",
            self.format, self.label, self.mime, self.puid
        )
    }
}
