//! Snak (claim value) parsing into display-ready values.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use url::{Host, Url};
use wikidp_sparql::ids::entity_id_to_int;

use crate::index::PropertyIndex;
use crate::model::Snak;
use crate::source::{commons_file_page, KnowledgeBase};

/// Properties whose string value is a Commons file name.
pub const IMAGE_PROPERTIES: [&str; 2] = ["P18", "P154"];

const TIME_INPUT_FORMAT: &str = "+%Y-%m-%dT%H:%M:%SZ";
const TIME_OUTPUT_FORMAT: &str = "%A, %B %-d, %Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnakValue {
    Text(String),
    Integer(i64),
    Float(f64),
    /// External identifier rendered through the property's formatter URL.
    Link { url: Option<String>, label: String },
    Property { pid: String, label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSnak {
    pub value: SnakValue,
    pub parse_type: Option<String>,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl ParsedSnak {
    pub fn is_external_id(&self) -> bool {
        self.parse_type.as_deref() == Some("external-id")
    }
}

/// Parsed snaks of one property inside a qualifier or reference set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnakGroup {
    pub pid: String,
    pub label: String,
    pub values: Vec<ParsedSnak>,
}

/// What parsing needs beyond the snak itself: property details and Commons.
pub struct SnakContext<'a> {
    pub index: PropertyIndex<'a>,
    kb: &'a dyn KnowledgeBase,
}

impl<'a> SnakContext<'a> {
    pub fn new(index: PropertyIndex<'a>, kb: &'a dyn KnowledgeBase) -> Self {
        Self { index, kb }
    }

    pub fn image_url(&self, title: &str) -> String {
        let title = title.replace(' ', "_");
        match self.kb.image_url(&title) {
            Ok(Some(url)) => url,
            Ok(None) => commons_file_page(&title),
            Err(err) => {
                tracing::warn!(%title, error = %err, "image lookup failed");
                commons_file_page(&title)
            }
        }
    }
}

/// `None` for `novalue`/`somevalue` snaks and for anything malformed (logged).
pub fn parse_snak(pid: &str, snak: &Snak, ctx: &mut SnakContext<'_>) -> Option<ParsedSnak> {
    match try_parse_snak(pid, snak, ctx) {
        Ok(parsed) => parsed,
        Err(reason) => {
            tracing::warn!(%pid, %reason, "unable to parse snak");
            None
        }
    }
}

fn try_parse_snak(
    pid: &str,
    snak: &Snak,
    ctx: &mut SnakContext<'_>,
) -> Result<Option<ParsedSnak>, String> {
    let Some(snaktype) = snak.snaktype.as_deref() else {
        return Err("snak has no snaktype".to_string());
    };
    if snaktype == "novalue" {
        return Ok(None);
    }
    let Some(datavalue) = &snak.datavalue else {
        return Ok(None);
    };

    let mut parse_type = snak.datatype.clone();
    let value_type = datavalue.kind.as_deref();
    let raw = &datavalue.value;

    let value = if IMAGE_PROPERTIES.contains(&pid) {
        parse_type = Some("image".to_string());
        SnakValue::Text(ctx.image_url(expect_str(raw, "image file name")?))
    } else if parse_type.as_deref() == Some("external-id") {
        let label = expect_str(raw, "external identifier")?;
        SnakValue::Link {
            url: ctx.index.formatter_url(pid, label),
            label: label.to_string(),
        }
    } else {
        match value_type {
            None => return Err("datavalue has no type".to_string()),
            Some("string") => {
                let text = expect_str(raw, "string value")?;
                if is_valid_url(text) {
                    parse_type = Some("url".to_string());
                }
                SnakValue::Text(text.to_string())
            }
            Some("wikibase-entityid") => {
                let entity_type = raw
                    .get("entity-type")
                    .and_then(Value::as_str)
                    .ok_or("entity value has no entity-type")?;
                parse_type = Some(entity_type.to_string());
                if entity_type == "property" {
                    let target = entity_ref(raw, 'P').ok_or("property value has no id")?;
                    let label = ctx.index.label(&target);
                    SnakValue::Property { pid: target, label }
                } else {
                    SnakValue::Text(entity_ref(raw, 'Q').ok_or("entity value has no id")?)
                }
            }
            Some("time") => {
                parse_type = Some("time".to_string());
                SnakValue::Text(format_time(expect_str(
                    raw.get("time").unwrap_or(&Value::Null),
                    "time",
                )?))
            }
            Some("quantity") if raw.get("amount").is_some() => {
                parse_amount(&raw["amount"]).ok_or("quantity amount is not a number")?
            }
            Some("monolingualtext") => SnakValue::Text(format!(
                "\"{}\" (language: {})",
                raw.get("text").and_then(Value::as_str).unwrap_or(""),
                raw.get("language").and_then(Value::as_str).unwrap_or("unknown"),
            )),
            Some(other) => SnakValue::Text(format!("Unable To Parse Value {other}")),
        }
    };

    Ok(Some(ParsedSnak {
        value,
        parse_type,
        value_type: value_type.unwrap_or_default().to_string(),
    }))
}

/// Parse a qualifier or reference snak set, ordered by numeric pid.
/// Properties without a single parseable value are dropped.
pub fn parse_snak_set(
    set: &BTreeMap<String, Vec<Snak>>,
    ctx: &mut SnakContext<'_>,
) -> Vec<SnakGroup> {
    let mut pids: Vec<&String> = set.keys().collect();
    pids.sort_by_key(|pid| entity_id_to_int(pid).unwrap_or(u64::MAX));

    let mut groups = Vec::new();
    for pid in pids {
        let values: Vec<ParsedSnak> = set[pid]
            .iter()
            .filter_map(|snak| parse_snak(pid, snak, ctx))
            .collect();
        if values.is_empty() {
            continue;
        }
        groups.push(SnakGroup {
            pid: pid.clone(),
            label: ctx.index.label(pid),
            values,
        });
    }
    groups
}

/// `+2001-12-31T00:00:00Z` -> `Monday, December 31, 2001`; anything else unchanged.
pub fn format_time(time: &str) -> String {
    NaiveDateTime::parse_from_str(time, TIME_INPUT_FORMAT)
        .map(|t| t.format(TIME_OUTPUT_FORMAT).to_string())
        .unwrap_or_else(|_| time.to_string())
}

/// Absolute http(s)/ftp URL with a dotted host name or an IP address.
pub fn is_valid_url(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https" | "ftp" | "ftps") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            domain.contains('.') && !domain.starts_with('.') && !domain.contains("..")
        }
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        None => false,
    }
}

fn expect_str<'v>(value: &'v Value, what: &str) -> Result<&'v str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{what} is not a string: {value}"))
}

fn entity_ref(raw: &Value, prefix: char) -> Option<String> {
    if prefix == 'P' {
        if let Some(n) = raw.get("numeric-id").and_then(Value::as_u64) {
            return Some(format!("P{n}"));
        }
    }
    if let Some(id) = raw.get("id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    raw.get("numeric-id")
        .and_then(Value::as_u64)
        .map(|n| format!("{prefix}{n}"))
}

fn parse_amount(amount: &Value) -> Option<SnakValue> {
    match amount {
        Value::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return Some(SnakValue::Integer(n));
            }
            // Integers wider than i64 keep every digit as text.
            let unsigned = s.strip_prefix('+').unwrap_or(s);
            let digits = unsigned.strip_prefix('-').unwrap_or(unsigned);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Some(SnakValue::Text(unsigned.to_string()));
            }
            s.parse::<f64>().ok().map(SnakValue::Float)
        }
        Value::Number(n) => n
            .as_i64()
            .map(SnakValue::Integer)
            .or_else(|| n.as_f64().map(SnakValue::Float)),
        _ => None,
    }
}
