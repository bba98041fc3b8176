use wikidp_sparql::SparqlError;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),
    #[error(transparent)]
    Sparql(#[from] SparqlError),
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for PortalError {
    fn from(value: reqwest::Error) -> Self {
        Self::KnowledgeBase(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
