//! The `Portal` facade: the services every controller needs, wired once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use wikidp_sparql::{FileFormat, IdPatterns, PropertyQueries, Row, SparqlEndpoint};

use crate::error::Result;
use crate::lang::LanguagePreference;
use crate::schema::dedupe_by_key;
use crate::source::KnowledgeBase;
use crate::write::ClaimWriter;

pub const DEFAULT_SCHEMA_DIR: &str = "schemas";

pub struct Portal {
    kb: Arc<dyn KnowledgeBase>,
    sparql: Arc<dyn SparqlEndpoint>,
    writer: Option<Arc<dyn ClaimWriter>>,
    languages: LanguagePreference,
    wikibase_language: String,
    ids: IdPatterns,
    schema_dir: PathBuf,
}

impl Portal {
    pub fn new(
        kb: Arc<dyn KnowledgeBase>,
        sparql: Arc<dyn SparqlEndpoint>,
        languages: LanguagePreference,
    ) -> Self {
        let wikibase_language = languages.wikibase_language();
        Self {
            kb,
            sparql,
            writer: None,
            languages,
            wikibase_language,
            ids: IdPatterns::default(),
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn ClaimWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_id_patterns(mut self, ids: IdPatterns) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }

    pub fn knowledge_base(&self) -> &dyn KnowledgeBase {
        self.kb.as_ref()
    }

    pub fn sparql(&self) -> &dyn SparqlEndpoint {
        self.sparql.as_ref()
    }

    pub fn writer(&self) -> Option<&dyn ClaimWriter> {
        self.writer.as_deref()
    }

    pub fn languages(&self) -> &LanguagePreference {
        &self.languages
    }

    /// `"lang"` or `"lang,fallback"`, as handed to the label service.
    pub fn wikibase_language(&self) -> &str {
        &self.wikibase_language
    }

    pub fn ids(&self) -> &IdPatterns {
        &self.ids
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    pub fn property_queries(&self) -> PropertyQueries<'_> {
        PropertyQueries::new(self.sparql.as_ref(), &self.wikibase_language)
    }

    // ========================================================================
    // Property catalogue lookups
    // ========================================================================

    pub fn property(&self, pid: &str) -> Result<Option<Row>> {
        Ok(self.property_queries().property(pid)?)
    }

    pub fn allowed_qualifiers(&self, pid: &str) -> Result<Vec<Row>> {
        let rows = self.property_queries().allowed_qualifiers(pid)?;
        Ok(dedupe_by_key(rows, "id"))
    }

    pub fn qualifier_properties(&self) -> Result<Vec<Row>> {
        let rows = self.property_queries().all_qualifier_properties()?;
        Ok(dedupe_by_key(rows, "id"))
    }

    pub fn reference_properties(&self) -> Result<Vec<Row>> {
        let rows = self.property_queries().all_reference_properties()?;
        Ok(dedupe_by_key(rows, "id"))
    }

    pub fn language_catalogue(&self) -> Result<Vec<Row>> {
        Ok(self.property_queries().all_languages()?)
    }

    pub fn file_formats(&self) -> Result<Vec<FileFormat>> {
        Ok(FileFormat::list_formats(
            self.sparql.as_ref(),
            &self.wikibase_language,
        )?)
    }
}
