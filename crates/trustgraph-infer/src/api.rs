//! Endpoint semantics, independent of the HTTP transport.
//!
//! Request bodies are shaped defensively: unparseable JSON is treated as `{}`
//! and malformed list elements are skipped, so callers always get a JSON
//! envelope back, never a transport-level failure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cards::SkillCardProvider;
use crate::error::PipelineError;
use crate::invoker::ModelInvoker;
use crate::model::{scalar_to_string, AgentWithCard, CanvasSize, GraphEdge, GraphNode};
use crate::pipeline::{AgentMatcher, GraphLayouter, LayoutRequest};

/// Status code plus JSON body. Errors use `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    pub fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(500, &e.to_string()),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    fn from_pipeline_error(endpoint: &str, err: &PipelineError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            tracing::error!(endpoint, error = %err, "request failed");
        } else {
            tracing::info!(endpoint, status, error = %err, "request rejected");
        }
        Self::error(status, &err.to_string())
    }
}

/// Body of the discover (agent matching) endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverRequest {
    pub query: String,
    pub agents: Vec<AgentWithCard>,
}

impl DiscoverRequest {
    /// `query` is stringified and trimmed; a non-array `agents` counts as empty.
    pub fn from_body(body: &[u8]) -> Self {
        let v = parse_body(body);
        let query = v
            .get("query")
            .and_then(scalar_to_string)
            .unwrap_or_default()
            .trim()
            .to_string();
        let agents = lenient_list(v.get("agents"), "agents");
        Self { query, agents }
    }
}

/// Parses the layout endpoint body. `nodes` must be an array.
pub fn layout_request_from_body(body: &[u8]) -> Result<LayoutRequest, PipelineError> {
    let v = parse_body(body);
    if !v.get("nodes").is_some_and(Value::is_array) {
        return Err(PipelineError::InvalidInput("Missing nodes array".to_string()));
    }
    let nodes: Vec<GraphNode> = lenient_list(v.get("nodes"), "nodes");
    let edges: Vec<GraphEdge> = lenient_list(v.get("edges"), "edges");
    let canvas = CanvasSize::from_optional(
        v.get("width").and_then(Value::as_f64),
        v.get("height").and_then(Value::as_f64),
    );
    Ok(LayoutRequest {
        nodes,
        edges,
        canvas,
    })
}

fn parse_body(body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(v) if v.is_object() => v,
        Ok(_) => Value::Object(Default::default()),
        Err(e) => {
            if !body.is_empty() {
                tracing::debug!(error = %e, "request body is not JSON; treating as empty");
            }
            Value::Object(Default::default())
        }
    }
}

fn lenient_list<T: serde::de::DeserializeOwned>(v: Option<&Value>, field: &str) -> Vec<T> {
    let Some(items) = v.and_then(Value::as_array) else {
        return Vec::new();
    };
    let parsed: Vec<T> = items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    if parsed.len() != items.len() {
        tracing::warn!(
            field,
            skipped = items.len() - parsed.len(),
            "skipped malformed list elements"
        );
    }
    parsed
}

/// Both LLM-backed endpoints.
pub struct Api {
    matcher: AgentMatcher,
    layouter: GraphLayouter,
}

impl Api {
    pub fn new(invoker: Arc<dyn ModelInvoker>, cards: Arc<dyn SkillCardProvider>) -> Self {
        Self {
            matcher: AgentMatcher::new(invoker.clone(), cards),
            layouter: GraphLayouter::new(invoker),
        }
    }

    pub fn matcher(&self) -> &AgentMatcher {
        &self.matcher
    }

    pub fn layouter(&self) -> &GraphLayouter {
        &self.layouter
    }

    /// `POST /api/discover`: `{query, agents}` → `{matches}`.
    pub async fn discover(&self, body: &[u8]) -> ApiReply {
        let request = DiscoverRequest::from_body(body);
        match self.matcher.rank(&request.query, request.agents).await {
            Ok(matches) => ApiReply::ok(&json!({ "matches": matches })),
            Err(e) => ApiReply::from_pipeline_error("discover", &e),
        }
    }

    /// `POST /api/graph-layout`: `{nodes, edges?, width?, height?}` → `{layout}`.
    pub async fn graph_layout(&self, body: &[u8]) -> ApiReply {
        let request = match layout_request_from_body(body) {
            Ok(r) => r,
            Err(e) => return ApiReply::from_pipeline_error("graph-layout", &e),
        };
        match self.layouter.layout(&request).await {
            Ok(layout) => ApiReply::ok(&json!({ "layout": layout })),
            Err(e) => ApiReply::from_pipeline_error("graph-layout", &e),
        }
    }
}
