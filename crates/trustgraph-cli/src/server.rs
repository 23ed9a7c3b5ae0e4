//! HTTP server for the LLM-backed endpoints.
//!
//! One hyper HTTP/1 connection per accepted socket, each on its own task.
//! The only shared value is an immutable `Arc<Api>`.
//!
//! Routes:
//! - `GET  /healthz`
//! - `POST /api/discover` (alias `/match`)
//! - `POST /api/graph-layout` (alias `/layout`)
//!
//! Dropping a connection drops its in-flight handler future, which also drops
//! (and so aborts) any outbound inference call it was awaiting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use trustgraph_infer::{Api, ApiReply};

/// Request bodies above this size are rejected with 413.
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct ServerConfig {
    pub listen: SocketAddr,
    /// If set, a small JSON file with the bound address is written once listening.
    pub ready_file: Option<PathBuf>,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Health,
    Discover,
    GraphLayout,
}

impl Route {
    fn resolve(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/healthz" => Some(Route::Health),
            "/api/discover" | "/match" => Some(Route::Discover),
            "/api/graph-layout" | "/layout" => Some(Route::GraphLayout),
            _ => None,
        }
    }

    fn method(self) -> Method {
        match self {
            Route::Health => Method::GET,
            Route::Discover | Route::GraphLayout => Method::POST,
        }
    }
}

pub(crate) async fn serve_async(config: ServerConfig, api: Arc<Api>) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(addr = %bound, "listening");
    if let Some(path) = config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, serde_json::to_string_pretty(&payload)?) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write ready file");
        }
    }

    serve_listener(listener, api, config.max_body_bytes).await
}

pub(crate) async fn serve_listener(
    listener: TcpListener,
    api: Arc<Api>,
    max_body_bytes: usize,
) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let api = api.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, api.clone(), max_body_bytes));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    api: Arc<Api>,
    max_body_bytes: usize,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let Some(route) = Route::resolve(&path) else {
        return Ok(json_error(StatusCode::NOT_FOUND, "not found"));
    };
    if method != route.method() {
        let mut resp = json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        if let Ok(allow) = route.method().as_str().parse() {
            resp.headers_mut().insert(ALLOW, allow);
        }
        return Ok(resp);
    }

    let resp = match route {
        Route::Health => text_response(StatusCode::OK, "ok\n"),
        Route::Discover => match read_body(req.into_body(), max_body_bytes).await {
            Ok(body) => reply_response(api.discover(&body).await),
            Err(resp) => resp,
        },
        Route::GraphLayout => match read_body(req.into_body(), max_body_bytes).await {
            Ok(body) => reply_response(api.graph_layout(&body).await),
            Err(resp) => resp,
        },
    };
    tracing::debug!(method = %method, path = %path, status = resp.status().as_u16(), "handled request");

    Ok(resp)
}

async fn read_body(body: Incoming, limit: usize) -> Result<Bytes, Response<Full<Bytes>>> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::info!(limit, "request body over limit");
            Err(json_error(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            Err(json_error(StatusCode::BAD_REQUEST, "failed to read request body"))
        }
    }
}

fn reply_response(reply: ApiReply) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &reply.body)
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": msg }))
}
