#[derive(Debug, thiserror::Error)]
pub enum SparqlError {
    #[error("SPARQL request failed: {0}")]
    Network(String),
    #[error("SPARQL endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid SPARQL response: {0}")]
    InvalidResponse(String),
    #[error("Query template has no value for `${0}`")]
    Template(String),
}

impl From<reqwest::Error> for SparqlError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SparqlError>;
