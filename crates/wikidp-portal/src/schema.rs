//! ShEx (JSON) schemas: which properties a schema expects, and the listing
//! of the schema directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use wikidp_sparql::{IdPatterns, Row};

use crate::error::{PortalError, Result};
use crate::portal::Portal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<DirectoryEntry>>,
}

/// Resolve `name` under `dir`, refusing absolute paths and `..`.
fn schema_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(PortalError::Schema(format!("invalid schema name `{name}`")));
    }
    Ok(dir.join(relative))
}

pub fn load_schema(dir: &Path, name: &str) -> Result<Value> {
    let path = schema_path(dir, name)?;
    let text = fs::read_to_string(&path)
        .map_err(|e| PortalError::Schema(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| PortalError::Schema(format!("{} is not valid JSON: {e}", path.display())))
}

/// Property ids named by the schema's triple-constraint predicates, first occurrence wins.
pub fn schema_properties(schema: &Value, ids: &IdPatterns) -> Vec<String> {
    let mut predicates: Vec<&str> = Vec::new();
    let shapes = schema
        .get("shapes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for shape in shapes {
        let Some(expression) = shape.get("expression") else {
            continue;
        };
        if let Some(nested) = expression.get("expressions").and_then(Value::as_array) {
            predicates.extend(
                nested
                    .iter()
                    .filter_map(|e| e.get("predicate").and_then(Value::as_str)),
            );
        }
        if let Some(predicate) = expression.get("predicate").and_then(Value::as_str) {
            predicates.push(predicate);
        }
    }

    let mut seen = HashSet::new();
    predicates
        .into_iter()
        .filter_map(|p| ids.pid_from_str(p))
        .filter(|pid| seen.insert(pid.clone()))
        .collect()
}

/// Recursive listing, sorted by name.
pub fn directory_listing(dir: &Path) -> Result<Vec<DirectoryEntry>> {
    let read = fs::read_dir(dir)
        .map_err(|e| PortalError::Schema(format!("cannot list {}: {e}", dir.display())))?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| PortalError::Schema(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let (kind, files) = if path.is_dir() {
            (EntryKind::Directory, Some(directory_listing(&path)?))
        } else {
            (EntryKind::File, None)
        };
        entries.push(DirectoryEntry {
            label: file_to_label(&name),
            name,
            kind,
            files,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// `file_format_schema.json` -> `File Format Schema`.
pub fn file_to_label(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(&stem.replace('_', " "))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

/// Keep the first row for each value of `key`; rows lacking the key count as one value.
pub fn dedupe_by_key(rows: Vec<Row>, key: &str) -> Vec<Row> {
    let mut seen: HashSet<Option<String>> = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.get(key).cloned()))
        .collect()
}

impl Portal {
    pub fn schema_properties(&self, name: &str) -> Result<Vec<String>> {
        let schema = load_schema(self.schema_dir(), name)?;
        Ok(schema_properties(&schema, self.ids()))
    }

    /// Property details for every property a schema names.
    pub fn property_checklist(&self, name: &str) -> Result<Vec<Row>> {
        let pids = self.schema_properties(name)?;
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.property_queries().details_by_pids(&pids)?)
    }

    pub fn schema_listing(&self) -> Result<Vec<DirectoryEntry>> {
        directory_listing(self.schema_dir())
    }
}
