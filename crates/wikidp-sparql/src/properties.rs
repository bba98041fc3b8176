//! Property-level queries: details, allowed qualifiers, qualifier/reference
//! property catalogues and the language list.

use crate::endpoint::{process_query, Row, SparqlEndpoint};
use crate::error::Result;
use crate::ids::values_clause;
use crate::templates::{
    QueryTemplate, ALL_LANGUAGES_QUERY, ALL_QUALIFIER_PROPERTIES, ALL_REFERENCE_PROPERTIES,
    PROPERTY_ALLOWED_QUALIFIERS, PROPERTY_QUERY,
};

/// Query helpers bound to one endpoint and one `wikibase:language` list (`"en"` or `"en,fr"`).
pub struct PropertyQueries<'a> {
    endpoint: &'a dyn SparqlEndpoint,
    language: &'a str,
}

impl<'a> PropertyQueries<'a> {
    pub fn new(endpoint: &'a dyn SparqlEndpoint, language: &'a str) -> Self {
        Self { endpoint, language }
    }

    /// Rows carry `id`, `propertyLabel`, `propertyDescription`, `propertyType` and,
    /// when the property has one, `formatter_url`.
    pub fn details_by_pids<S: AsRef<str>>(&self, pids: &[S]) -> Result<Vec<Row>> {
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let values = values_clause(pids);
        let query = QueryTemplate::new(PROPERTY_QUERY)
            .substitute(&[("values", values.as_str()), ("language", self.language)])?;
        process_query(self.endpoint, &query)
    }

    pub fn property(&self, pid: &str) -> Result<Option<Row>> {
        Ok(self.details_by_pids(&[pid])?.into_iter().next())
    }

    pub fn allowed_qualifiers(&self, pid: &str) -> Result<Vec<Row>> {
        let values = values_clause(&[pid]);
        let query = QueryTemplate::new(PROPERTY_ALLOWED_QUALIFIERS)
            .substitute(&[("values", values.as_str()), ("language", self.language)])?;
        process_query(self.endpoint, &query)
    }

    pub fn all_qualifier_properties(&self) -> Result<Vec<Row>> {
        self.run_static(ALL_QUALIFIER_PROPERTIES)
    }

    pub fn all_reference_properties(&self) -> Result<Vec<Row>> {
        self.run_static(ALL_REFERENCE_PROPERTIES)
    }

    /// Rows carry `item`, `code`, `itemLabel`, `label` and `display`.
    pub fn all_languages(&self) -> Result<Vec<Row>> {
        self.run_static(ALL_LANGUAGES_QUERY)
    }

    fn run_static(&self, template: &str) -> Result<Vec<Row>> {
        let query = QueryTemplate::new(template).substitute(&[("language", self.language)])?;
        process_query(self.endpoint, &query)
    }
}
