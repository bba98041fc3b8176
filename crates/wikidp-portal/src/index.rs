//! Per-request property cache: details fetched in one batch up front, single
//! lookups for anything the batch missed.

use std::collections::HashMap;

use wikidp_sparql::{get_value, PropertyQueries, Row};

pub struct PropertyIndex<'a> {
    queries: PropertyQueries<'a>,
    rows: HashMap<String, Option<Row>>,
}

impl<'a> PropertyIndex<'a> {
    pub fn new(queries: PropertyQueries<'a>) -> Self {
        Self {
            queries,
            rows: HashMap::new(),
        }
    }

    /// Seed the cache with rows from a batch details query.
    pub fn preload(&mut self, rows: &[Row]) {
        for row in rows {
            if let Some(id) = row.get("id") {
                self.rows.insert(id.clone(), Some(row.clone()));
            }
        }
    }

    pub fn row(&mut self, pid: &str) -> Option<&Row> {
        if !self.rows.contains_key(pid) {
            let fetched = match self.queries.property(pid) {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(%pid, error = %err, "property lookup failed");
                    None
                }
            };
            self.rows.insert(pid.to_string(), fetched);
        }
        self.rows.get(pid).and_then(Option::as_ref)
    }

    pub fn label(&mut self, pid: &str) -> String {
        match self.row(pid).map(|row| get_value(row, "propertyLabel", "")) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("property {pid}"),
        }
    }

    /// The property's formatter URL with `$1` replaced by the trimmed value.
    pub fn formatter_url(&mut self, pid: &str, value: &str) -> Option<String> {
        let pattern = self.row(pid)?.get("formatter_url")?;
        Some(pattern.replace("$1", value.trim()))
    }
}
