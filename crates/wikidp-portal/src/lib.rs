//! The WikiDP portal core.
//!
//! Reads items from the knowledge base and reshapes them for display
//! (`detail`, `snak`), searches by text or PUID (`search`), reads ShEx
//! schemas (`schema`) and writes user claims back (`write`). Everything
//! hangs off [`Portal`], which owns the service handles.

pub mod detail;
pub mod error;
pub mod filters;
pub mod index;
pub mod lang;
pub mod model;
pub mod portal;
pub mod schema;
pub mod search;
pub mod snak;
pub mod source;
pub mod write;

pub use detail::{ItemDetail, ItemStatements, ParsedClaim, StatementValue};
pub use error::{PortalError, Result};
pub use index::PropertyIndex;
pub use lang::LanguagePreference;
pub use model::{DataValue, Entity, Reference, Snak, Statement};
pub use portal::{Portal, DEFAULT_SCHEMA_DIR};
pub use schema::{dedupe_by_key, directory_listing, load_schema, schema_properties, DirectoryEntry};
pub use search::{PuidHit, SearchHit};
pub use snak::{parse_snak, ParsedSnak, SnakContext, SnakGroup, SnakValue};
pub use source::{HttpKnowledgeBase, KnowledgeBase, DEFAULT_API_URL};
pub use write::{
    parse_claim_drafts, ClaimDraft, ClaimValue, ClaimWriter, HttpClaimWriter, SnakDraft, WriteAuth,
    WriteReport, DEFAULT_WRITE_API_URL,
};

pub use wikidp_sparql as sparql;
