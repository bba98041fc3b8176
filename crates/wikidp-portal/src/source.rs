//! Read access to the knowledge base: entity JSON, text search and Commons
//! image resolution.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use wikidp_sparql::DEFAULT_USER_AGENT;

use crate::error::{PortalError, Result};

pub const DEFAULT_API_URL: &str = "https://www.wikidata.org/w/api.php";
pub const COMMONS_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const COMMONS_FILE_URL: &str = "https://commons.wikimedia.org/wiki/File:";

/// How many hits a text search asks for.
pub const SEARCH_LIMIT: usize = 10;

pub trait KnowledgeBase: Send + Sync {
    /// The raw `entities.<id>` object, `None` when no such entity exists.
    fn entity_json(&self, id: &str) -> Result<Option<Value>>;

    /// Item ids matching `text`, best match first.
    fn search(&self, text: &str, language: &str, limit: usize) -> Result<Vec<String>>;

    /// Direct URL of a Commons file, `None` when Commons does not know it.
    fn image_url(&self, title: &str) -> Result<Option<String>>;
}

pub(crate) fn build_http_client(
    user_agent: &str,
    timeout: Duration,
    cookies: bool,
) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .cookie_store(cookies)
        .build()
        .map_err(|e| PortalError::KnowledgeBase(format!("failed to build http client: {e}")))
}

/// Surface `{"error": {"code", "info"}}` bodies of the action API.
pub(crate) fn api_error(body: &Value) -> Option<(String, String)> {
    let error = body.get("error")?;
    let code = error.get("code").and_then(Value::as_str).unwrap_or("unknown");
    let info = error.get("info").and_then(Value::as_str).unwrap_or("");
    Some((code.to_string(), info.to_string()))
}

pub struct HttpKnowledgeBase {
    client: Client,
    api_url: String,
    commons_api_url: String,
}

impl HttpKnowledgeBase {
    pub fn new(api_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(user_agent, timeout, false)?,
            api_url: api_url.to_string(),
            commons_api_url: COMMONS_API_URL.to_string(),
        })
    }

    pub fn with_commons_api(mut self, url: &str) -> Self {
        self.commons_api_url = url.to_string();
        self
    }

    fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value> {
        let resp = self.client.get(url).query(params).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PortalError::KnowledgeBase(format!("{url} returned HTTP {status}")));
        }
        resp.json::<Value>()
            .map_err(|e| PortalError::KnowledgeBase(format!("invalid JSON from {url}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
}

impl KnowledgeBase for HttpKnowledgeBase {
    fn entity_json(&self, id: &str) -> Result<Option<Value>> {
        tracing::debug!(%id, "fetching entity");
        let body = self.get_json(
            &self.api_url,
            &[("action", "wbgetentities"), ("ids", id), ("format", "json")],
        )?;

        if let Some((code, info)) = api_error(&body) {
            if code == "no-such-entity" {
                return Ok(None);
            }
            return Err(PortalError::KnowledgeBase(format!("{code}: {info}")));
        }

        let Some(entities) = body.get("entities").and_then(Value::as_object) else {
            return Err(PortalError::KnowledgeBase("response has no entities".to_string()));
        };
        // Redirected ids come back keyed by their target.
        let entity = entities
            .get(id)
            .or_else(|| entities.values().next())
            .cloned();
        Ok(entity.filter(|e| e.get("missing").is_none()))
    }

    fn search(&self, text: &str, language: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let body = self.get_json(
            &self.api_url,
            &[
                ("action", "wbsearchentities"),
                ("search", text),
                ("language", language),
                ("uselang", language),
                ("type", "item"),
                ("limit", limit.as_str()),
                ("format", "json"),
            ],
        )?;
        if let Some((code, info)) = api_error(&body) {
            return Err(PortalError::KnowledgeBase(format!("{code}: {info}")));
        }
        let parsed: SearchResponse = serde_json::from_value(body)
            .map_err(|e| PortalError::KnowledgeBase(format!("unexpected search response: {e}")))?;
        Ok(parsed.search.into_iter().map(|hit| hit.id).collect())
    }

    fn image_url(&self, title: &str) -> Result<Option<String>> {
        let file = format!("File:{title}");
        let body = self.get_json(
            &self.commons_api_url,
            &[
                ("action", "query"),
                ("prop", "imageinfo"),
                ("iiprop", "url"),
                ("titles", file.as_str()),
                ("format", "json"),
            ],
        )?;
        Ok(first_image_info_url(&body))
    }
}

fn first_image_info_url(body: &Value) -> Option<String> {
    body.get("query")?
        .get("pages")?
        .as_object()?
        .values()
        .next()?
        .get("imageinfo")?
        .get(0)?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

/// Fallback page URL when Commons cannot resolve a file.
pub fn commons_file_page(title: &str) -> String {
    format!("{COMMONS_FILE_URL}{title}")
}
