//! Claim writing: user drafts turned into typed values and submitted through
//! a `ClaimWriter`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use wikidp_sparql::ids::entity_id_to_int;

use crate::error::{PortalError, Result};
use crate::portal::Portal;
use crate::source::{api_error, build_http_client};

/// The sandbox instance; writes never go to the live knowledge base unless configured.
pub const DEFAULT_WRITE_API_URL: &str = "https://test.wikidata.org/w/api.php";
pub const WRITE_SUMMARY: &str = "Adding claim";
const GREGORIAN_CALENDAR: &str = "http://www.wikidata.org/entity/Q1985727";
const DAY_PRECISION: u8 = 11;

// ============================================================================
// Drafts and values
// ============================================================================

/// One claim as posted by the client: `{pid, value, type, qualifiers?, references?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    pub pid: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<SnakDraft>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<SnakDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnakDraft {
    pub pid: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    Item(u64),
    Property(u64),
    Quantity { amount: String, unit: String },
    Time { time: String, precision: u8 },
    MonolingualText { text: String, language: String },
    String(String),
}

impl ClaimValue {
    /// Interpret a user value according to the property type name the client sent.
    pub fn from_user(value_type: &str, value: &Value) -> Result<Self> {
        match value_type {
            "WikibaseItem" => Ok(Self::Item(entity_number(value, 'Q')?)),
            "WikibaseProperty" => Ok(Self::Property(entity_number(value, 'P')?)),
            "Quantity" => Ok(Self::Quantity {
                amount: signed_amount(value)?,
                unit: "1".to_string(),
            }),
            "Time" => Ok(Self::Time {
                time: normalize_time(value)?,
                precision: DAY_PRECISION,
            }),
            "MonolingualText" => {
                let text = value.get("text").and_then(Value::as_str);
                let language = value.get("language").and_then(Value::as_str);
                match (text, language) {
                    (Some(text), Some(language)) => Ok(Self::MonolingualText {
                        text: text.to_string(),
                        language: language.to_string(),
                    }),
                    _ => Err(PortalError::InvalidPayload(format!(
                        "monolingual text needs text and language: {value}"
                    ))),
                }
            }
            _ => Ok(Self::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
        }
    }

    /// The `value` parameter of `wbcreateclaim` / `wbsetqualifier`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Item(n) => json!({"entity-type": "item", "numeric-id": n}),
            Self::Property(n) => json!({"entity-type": "property", "numeric-id": n}),
            Self::Quantity { amount, unit } => json!({"amount": amount, "unit": unit}),
            Self::Time { time, precision } => json!({
                "time": time,
                "timezone": 0,
                "before": 0,
                "after": 0,
                "precision": precision,
                "calendarmodel": GREGORIAN_CALENDAR,
            }),
            Self::MonolingualText { text, language } => json!({"text": text, "language": language}),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    pub fn datavalue_type(&self) -> &'static str {
        match self {
            Self::Item(_) | Self::Property(_) => "wikibase-entityid",
            Self::Quantity { .. } => "quantity",
            Self::Time { .. } => "time",
            Self::MonolingualText { .. } => "monolingualtext",
            Self::String(_) => "string",
        }
    }

    fn to_snak(&self, pid: &str) -> Value {
        json!({
            "snaktype": "value",
            "property": pid,
            "datavalue": {"type": self.datavalue_type(), "value": self.to_json()},
        })
    }
}

fn entity_number(value: &Value, prefix: char) -> Result<u64> {
    let invalid = || PortalError::InvalidPayload(format!("expected a {prefix}-id, got {value}"));
    let id = value.as_str().ok_or_else(invalid)?.trim();
    if !id.to_ascii_uppercase().starts_with(prefix) {
        return Err(invalid());
    }
    entity_id_to_int(id).ok_or_else(invalid)
}

fn signed_amount(value: &Value) -> Result<String> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(PortalError::InvalidPayload(format!(
                "quantity is not a number: {other}"
            )))
        }
    };
    if raw.parse::<f64>().is_err() {
        return Err(PortalError::InvalidPayload(format!("quantity is not a number: {raw}")));
    }
    if raw.starts_with('+') || raw.starts_with('-') {
        Ok(raw)
    } else {
        Ok(format!("+{raw}"))
    }
}

/// Accepts `+YYYY-MM-DDTHH:MM:SSZ` or a plain `YYYY-MM-DD` date; both are
/// written at day precision.
fn normalize_time(value: &Value) -> Result<String> {
    let raw = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| PortalError::InvalidPayload(format!("time is not a string: {value}")))?;
    let date = NaiveDateTime::parse_from_str(raw, "+%Y-%m-%dT%H:%M:%SZ")
        .map(|t| t.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|e| PortalError::InvalidPayload(format!("unrecognised date `{raw}`: {e}")))?;
    Ok(format!("+{}T00:00:00Z", date.format("%Y-%m-%d")))
}

pub fn parse_claim_drafts(body: &[u8]) -> Result<Vec<ClaimDraft>> {
    serde_json::from_slice(body).map_err(|e| PortalError::InvalidPayload(e.to_string()))
}

// ============================================================================
// Writer seam
// ============================================================================

pub trait ClaimWriter: Send + Sync {
    /// Create a claim on `entity`, returning the new claim (statement) id.
    fn create_claim(&self, entity: &str, pid: &str, value: &ClaimValue, summary: &str)
        -> Result<String>;

    fn set_qualifier(&self, claim_id: &str, pid: &str, value: &ClaimValue) -> Result<()>;

    /// Attach one reference made of `snaks` to a claim.
    fn set_reference(&self, claim_id: &str, snaks: &[(String, ClaimValue)]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAuth {
    /// Bot password login (`User@BotName` plus the generated password).
    BotPassword { user: String, password: String },
    OAuthToken(String),
    Anonymous,
}

pub struct HttpClaimWriter {
    client: Client,
    api_url: String,
    auth: WriteAuth,
    csrf_token: Mutex<Option<String>>,
}

impl HttpClaimWriter {
    pub fn new(api_url: &str, auth: WriteAuth, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(user_agent, timeout, true)?,
            api_url: api_url.to_string(),
            auth,
            csrf_token: Mutex::new(None),
        })
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.auth {
            WriteAuth::OAuthToken(token) => match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(header) => request.header(AUTHORIZATION, header),
                Err(_) => request,
            },
            _ => request,
        }
    }

    fn get(&self, params: &[(&str, &str)]) -> Result<Value> {
        let resp = self.authorize(self.client.get(&self.api_url).query(params)).send()?;
        Self::read_body(resp)
    }

    fn post(&self, params: &[(&str, &str)]) -> Result<Value> {
        let resp = self.authorize(self.client.post(&self.api_url).form(params)).send()?;
        Self::read_body(resp)
    }

    fn read_body(resp: reqwest::blocking::Response) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            return Err(PortalError::Write(format!("write API returned HTTP {status}")));
        }
        resp.json::<Value>()
            .map_err(|e| PortalError::Write(format!("invalid write API response: {e}")))
    }

    fn token(&self, kind: &str) -> Result<String> {
        let body = self.get(&[
            ("action", "query"),
            ("meta", "tokens"),
            ("type", kind),
            ("format", "json"),
        ])?;
        let key = format!("{kind}token");
        body.get("query")
            .and_then(|q| q.get("tokens"))
            .and_then(|t| t.get(&key))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortalError::Write(format!("no {key} in response")))
    }

    fn login(&self, user: &str, password: &str) -> Result<()> {
        let login_token = self.token("login")?;
        let body = self.post(&[
            ("action", "login"),
            ("lgname", user),
            ("lgpassword", password),
            ("lgtoken", login_token.as_str()),
            ("format", "json"),
        ])?;
        let result = body
            .get("login")
            .and_then(|l| l.get("result"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if result != "Success" {
            return Err(PortalError::Write(format!("login as {user} failed: {result}")));
        }
        tracing::info!(%user, "logged in to write API");
        Ok(())
    }

    fn csrf_token(&self) -> Result<String> {
        let mut cached = self.csrf_token.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        if let WriteAuth::BotPassword { user, password } = &self.auth {
            self.login(user, password)?;
        }
        let token = self.token("csrf")?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn forget_token(&self) {
        *self.csrf_token.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Post a token-protected action, fetching a fresh token once on `badtoken`.
    fn post_with_token(&self, params: &[(&str, &str)]) -> Result<Value> {
        for attempt in 0..2 {
            let token = self.csrf_token()?;
            let mut full: Vec<(&str, &str)> = params.to_vec();
            full.push(("token", token.as_str()));
            full.push(("format", "json"));
            if matches!(self.auth, WriteAuth::BotPassword { .. }) {
                full.push(("bot", "1"));
            }

            let body = self.post(&full)?;
            match api_error(&body) {
                None => return Ok(body),
                Some((code, _)) if code == "badtoken" && attempt == 0 => {
                    tracing::debug!("CSRF token expired, refreshing");
                    self.forget_token();
                }
                Some((code, info)) => return Err(PortalError::Write(format!("{code}: {info}"))),
            }
        }
        Err(PortalError::Write("CSRF token rejected twice".to_string()))
    }
}

impl ClaimWriter for HttpClaimWriter {
    fn create_claim(
        &self,
        entity: &str,
        pid: &str,
        value: &ClaimValue,
        summary: &str,
    ) -> Result<String> {
        let value = value.to_json().to_string();
        let body = self.post_with_token(&[
            ("action", "wbcreateclaim"),
            ("entity", entity),
            ("property", pid),
            ("snaktype", "value"),
            ("value", value.as_str()),
            ("summary", summary),
        ])?;
        body.get("claim")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortalError::Write("wbcreateclaim returned no claim id".to_string()))
    }

    fn set_qualifier(&self, claim_id: &str, pid: &str, value: &ClaimValue) -> Result<()> {
        let value = value.to_json().to_string();
        self.post_with_token(&[
            ("action", "wbsetqualifier"),
            ("claim", claim_id),
            ("property", pid),
            ("snaktype", "value"),
            ("value", value.as_str()),
        ])?;
        Ok(())
    }

    fn set_reference(&self, claim_id: &str, snaks: &[(String, ClaimValue)]) -> Result<()> {
        let snaks = reference_snaks(snaks).to_string();
        self.post_with_token(&[
            ("action", "wbsetreference"),
            ("statement", claim_id),
            ("snaks", snaks.as_str()),
        ])?;
        Ok(())
    }
}

/// `{"P248": [snak, ...], ...}` as `wbsetreference` expects.
fn reference_snaks(snaks: &[(String, ClaimValue)]) -> Value {
    let mut grouped = Map::new();
    for (pid, value) in snaks {
        let entry = grouped
            .entry(pid.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(value.to_snak(pid));
        }
    }
    Value::Object(grouped)
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReport {
    pub status: String,
    pub successful_claims: Vec<ClaimDraft>,
    pub failure_claims: Vec<ClaimDraft>,
}

impl Portal {
    /// Write each draft independently; a failing draft never stops the others.
    pub fn write_claims(&self, qid: &str, drafts: Vec<ClaimDraft>) -> Result<WriteReport> {
        if !self.ids().is_item(qid) {
            return Err(PortalError::InvalidId(qid.to_string()));
        }
        let writer = self
            .writer()
            .ok_or_else(|| PortalError::Write("no claim writer is configured".to_string()))?;
        let qid = qid.to_ascii_uppercase();

        let mut report = WriteReport {
            status: "success".to_string(),
            successful_claims: Vec::new(),
            failure_claims: Vec::new(),
        };
        for draft in drafts {
            match write_claim(writer, &qid, &draft) {
                Ok(claim_id) => {
                    tracing::info!(%qid, pid = %draft.pid, %claim_id, "claim written");
                    report.successful_claims.push(draft);
                }
                Err(err) => {
                    tracing::warn!(%qid, pid = %draft.pid, error = %err, "claim write failed");
                    report.failure_claims.push(draft);
                }
            }
        }
        Ok(report)
    }
}

fn write_claim(writer: &dyn ClaimWriter, qid: &str, draft: &ClaimDraft) -> Result<String> {
    let value = ClaimValue::from_user(&draft.value_type, &draft.value)?;
    let qualifiers = draft
        .qualifiers
        .iter()
        .map(|q| Ok((q.pid.clone(), ClaimValue::from_user(&q.value_type, &q.value)?)))
        .collect::<Result<Vec<_>>>()?;
    let references = draft
        .references
        .iter()
        .map(|r| Ok((r.pid.clone(), ClaimValue::from_user(&r.value_type, &r.value)?)))
        .collect::<Result<Vec<_>>>()?;

    let claim_id = writer.create_claim(qid, &draft.pid, &value, WRITE_SUMMARY)?;
    for (pid, value) in &qualifiers {
        writer.set_qualifier(&claim_id, pid, value)?;
    }
    if !references.is_empty() {
        writer.set_reference(&claim_id, &references)?;
    }
    Ok(claim_id)
}
