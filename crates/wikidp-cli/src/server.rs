//! WikiDP HTTP API.
//!
//! A small hyper server in front of [`Portal`]. Every portal call talks to
//! remote services through blocking clients, so handlers hop onto the
//! blocking pool and the accept loop never waits on the knowledge base.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use wikidp_portal::{parse_claim_drafts, Portal, PortalError};
use wikidp_sparql::IdPatterns;

pub(crate) const WELCOME: &str = "Welcome to the WikiDP API";

pub(crate) struct ServerConfig {
    pub listen: SocketAddr,
    /// Written once listening, so scripts can learn the bound port.
    pub ready_file: Option<PathBuf>,
}

pub(crate) fn cmd_serve(portal: Portal, config: ServerConfig) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(Arc::new(portal), config).await })
}

async fn serve_async(portal: Arc<Portal>, config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(addr = %bound, "listening on http://{bound}");
    if let Some(path) = config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        // Written then renamed so readers never see a partial file.
        let tmp = path.with_extension("tmp");
        let written = std::fs::write(&tmp, serde_json::to_string_pretty(&payload).unwrap_or_default())
            .and_then(|_| std::fs::rename(&tmp, path));
        if let Err(e) = written {
            tracing::warn!(path = %path.display(), error = %e, "failed to write ready file");
        }
    }

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let portal = portal.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, portal.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    Health,
    Welcome,
    Item(String),
    ItemDetail(String),
    ItemCounts(String),
    WriteClaims(String),
    Property(String),
    PropertyQualifiers(String),
    Search(String),
    SearchContext(String),
    Puid(String),
    Formats,
    Languages,
    Qualifiers,
    References,
    Schemas,
    SchemaProperties(String),
    NotFound,
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

/// Map a method and raw (still percent-encoded) path to a route.
pub(crate) fn route(method: &Method, path: &str, ids: &IdPatterns) -> Route {
    let get = method == Method::GET;
    let get_or_post = get || method == Method::POST;

    if path == "/healthz" {
        return if get { Route::Health } else { Route::NotFound };
    }
    let Some(rest) = path.strip_prefix("/api/") else {
        return Route::NotFound;
    };

    // Schema names may contain `/`.
    if let Some(name) = rest
        .strip_prefix("schema/")
        .and_then(|r| r.strip_suffix("/properties"))
    {
        return match decode(name) {
            Some(name) if get && !name.is_empty() => Route::SchemaProperties(name),
            _ => Route::NotFound,
        };
    }

    let segments: Vec<&str> = rest.split('/').collect();
    let routed = match segments.as_slice() {
        [""] => get.then_some(Route::Welcome),
        ["formats"] => get.then_some(Route::Formats),
        ["languages"] => get.then_some(Route::Languages),
        ["qualifiers"] => get.then_some(Route::Qualifiers),
        ["references"] => get.then_some(Route::References),
        ["schemas"] => get.then_some(Route::Schemas),
        ["search", "context", text] => get
            .then(|| decode(text).map(Route::SearchContext))
            .flatten(),
        ["search", text] => get_or_post.then(|| decode(text).map(Route::Search)).flatten(),
        ["puid", puid] => get.then(|| decode(puid).map(Route::Puid)).flatten(),
        [id] if ids.is_item(id) => get_or_post.then(|| Route::Item(id.to_string())),
        [id] if ids.is_property(id) => get_or_post.then(|| Route::Property(id.to_string())),
        [id, "detail"] if ids.is_item(id) => get.then(|| Route::ItemDetail(id.to_string())),
        [id, "counts"] if ids.is_item(id) => get.then(|| Route::ItemCounts(id.to_string())),
        [id, "claims", "write"] if ids.is_item(id) => {
            (method == Method::POST).then(|| Route::WriteClaims(id.to_string()))
        }
        [id, "qualifiers"] if ids.is_property(id) => {
            get.then(|| Route::PropertyQualifiers(id.to_string()))
        }
        _ => None,
    };
    routed.unwrap_or(Route::NotFound)
}

async fn handle_request(
    req: Request<Incoming>,
    portal: Arc<Portal>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = route(&method, &path, portal.ids());
    tracing::debug!(%method, %path, ?route, "request");

    let resp = match route {
        Route::Health => text_response(StatusCode::OK, "ok\n"),
        Route::Welcome => text_response(StatusCode::OK, WELCOME),
        Route::Item(qid) => with_portal(portal, move |p| p.item_detail(&qid, false)).await,
        Route::ItemDetail(qid) => with_portal(portal, move |p| p.item_detail(&qid, true)).await,
        Route::ItemCounts(qid) => with_portal(portal, move |p| Ok(p.property_counts(&qid))).await,
        Route::WriteClaims(qid) => {
            let body = req.into_body().collect().await?.to_bytes().to_vec();
            match parse_claim_drafts(&body) {
                Ok(drafts) => {
                    with_portal(portal, move |p| p.write_claims(&qid, drafts).map(Some)).await
                }
                Err(e) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
            }
        }
        Route::Property(pid) => with_portal(portal, move |p| p.property(&pid)).await,
        Route::PropertyQualifiers(pid) => {
            with_portal(portal, move |p| p.allowed_qualifiers(&pid).map(Some)).await
        }
        Route::Search(text) => {
            with_portal(portal, move |p| p.search_result_list(text.trim()).map(Some)).await
        }
        Route::SearchContext(text) => {
            with_portal(portal, move |p| p.search_result_context(text.trim()).map(Some)).await
        }
        Route::Puid(puid) => {
            with_portal(portal, move |p| {
                let (puid, results) = p.search_by_puid(&puid)?;
                Ok(Some(serde_json::json!({ "puid": puid, "results": results })))
            })
            .await
        }
        Route::Formats => with_portal(portal, |p| p.file_formats().map(Some)).await,
        Route::Languages => with_portal(portal, |p| p.language_catalogue().map(Some)).await,
        Route::Qualifiers => with_portal(portal, |p| p.qualifier_properties().map(Some)).await,
        Route::References => with_portal(portal, |p| p.reference_properties().map(Some)).await,
        Route::Schemas => with_portal(portal, |p| p.schema_listing().map(Some)).await,
        Route::SchemaProperties(name) => {
            with_portal(portal, move |p| p.property_checklist(&name).map(Some)).await
        }
        Route::NotFound => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(resp)
}

/// Run a portal call on the blocking pool; `None` renders as 404.
async fn with_portal<T, F>(portal: Arc<Portal>, f: F) -> Response<Full<Bytes>>
where
    F: FnOnce(&Portal) -> wikidp_portal::Result<Option<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(portal.as_ref())).await {
        Ok(Ok(Some(value))) => json_response(StatusCode::OK, &value),
        Ok(Ok(None)) => json_error(StatusCode::NOT_FOUND, "not found"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "request failed");
            json_error(error_status(&e), &e.to_string())
        }
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("worker task failed: {e}"),
        ),
    }
}

pub(crate) fn error_status(err: &PortalError) -> StatusCode {
    match err {
        PortalError::InvalidId(_) | PortalError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        PortalError::Schema(_) => StatusCode::NOT_FOUND,
        PortalError::Write(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortalError::KnowledgeBase(_) | PortalError::Sparql(_) => StatusCode::BAD_GATEWAY,
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "error": msg });
    json_response(status, &v)
}
