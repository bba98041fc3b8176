//! SPARQL layer for the WikiDP portal.
//!
//! - `templates`: the parametrized queries (flattened, `$name` placeholders)
//! - `endpoint`: the `SparqlEndpoint` seam, the HTTP implementation and
//!   binding flattening into plain rows
//! - `properties` / `formats`: the typed lookups the portal builds on
//! - `ids`: item/property identifier helpers shared by every layer

pub mod endpoint;
pub mod error;
pub mod formats;
pub mod ids;
pub mod properties;
pub mod templates;

pub use endpoint::{
    flatten_bindings, get_value, process_query, HttpSparqlEndpoint, Row, SparqlEndpoint,
    DEFAULT_SPARQL_URL, DEFAULT_USER_AGENT,
};
pub use error::{Result, SparqlError};
pub use formats::{FileFormat, PuidSearchResult};
pub use ids::IdPatterns;
pub use properties::PropertyQueries;
pub use templates::{flatten_query, QueryTemplate};
