//! SPARQL execution and result flattening.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde_json::Value;

use crate::error::{Result, SparqlError};

pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_USER_AGENT: &str = "wikidp-portal/0.3 (https://github.com/WikiDP/wikidp-portal)";

/// One result row: variable name -> plain value.
pub type Row = BTreeMap<String, String>;

/// Anything that can answer a SPARQL query with a `application/sparql-results+json` document.
pub trait SparqlEndpoint: Send + Sync {
    fn execute(&self, query: &str) -> Result<Value>;
}

pub struct HttpSparqlEndpoint {
    client: Client,
    url: String,
}

impl HttpSparqlEndpoint {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/sparql-results+json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SparqlError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SparqlEndpoint for HttpSparqlEndpoint {
    fn execute(&self, query: &str) -> Result<Value> {
        tracing::debug!(endpoint = %self.url, %query, "executing SPARQL query");
        let resp = self
            .client
            .post(&self.url)
            .form(&[("query", query), ("format", "json")])
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SparqlError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        resp.json::<Value>()
            .map_err(|e| SparqlError::InvalidResponse(e.to_string()))
    }
}

/// Keep only the `value` of every binding, dropping `type`/`xml:lang`/`datatype`.
pub fn flatten_bindings(results: &Value) -> Result<Vec<Row>> {
    let bindings = results
        .get("results")
        .and_then(|r| r.get("bindings"))
        .ok_or_else(|| SparqlError::InvalidResponse("missing results.bindings".to_string()))?;

    let Some(bindings) = bindings.as_array() else {
        return Err(SparqlError::InvalidResponse(
            "results.bindings is not an array".to_string(),
        ));
    };

    Ok(bindings
        .iter()
        .filter_map(Value::as_object)
        .map(|binding| {
            binding
                .iter()
                .filter_map(|(name, cell)| {
                    let value = cell.get("value")?;
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some((name.clone(), value))
                })
                .collect()
        })
        .collect())
}

pub fn process_query(endpoint: &dyn SparqlEndpoint, query: &str) -> Result<Vec<Row>> {
    let results = endpoint.execute(query)?;
    flatten_bindings(&results)
}

pub fn get_value<'a>(row: &'a Row, key: &str, default: &'a str) -> &'a str {
    row.get(key).map(String::as_str).unwrap_or(default)
}

/// Quote a user-supplied string as a SPARQL string literal.
pub fn sparql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
