//! The two inference pipelines: prompt → model → extraction.

use std::sync::Arc;

use crate::cards::SkillCardProvider;
use crate::error::PipelineError;
use crate::extract::{extract_layout, extract_matches, ParserChain};
use crate::invoker::{ModelInvoker, ModelRequest};
use crate::model::{AgentWithCard, CanvasSize, GraphEdge, GraphNode, LayoutPoint, MatchResult};
use crate::prompt::{
    build_layout_prompt, build_match_prompt, LAYOUT_SYSTEM_PROMPT, MATCH_SYSTEM_PROMPT,
    MAX_PROMPT_AGENTS,
};

/// Deterministic ranking.
pub const MATCH_TEMPERATURE: f64 = 0.0;
/// Slight variance keeps layouts from collapsing into a grid.
pub const LAYOUT_TEMPERATURE: f64 = 0.3;

// ============================================================================
// AgentMatcher
// ============================================================================

pub struct AgentMatcher {
    invoker: Arc<dyn ModelInvoker>,
    cards: Arc<dyn SkillCardProvider>,
    parsers: ParserChain,
}

impl AgentMatcher {
    pub fn new(invoker: Arc<dyn ModelInvoker>, cards: Arc<dyn SkillCardProvider>) -> Self {
        Self {
            invoker,
            cards,
            parsers: ParserChain::standard(),
        }
    }

    pub fn with_parsers(mut self, parsers: ParserChain) -> Self {
        self.parsers = parsers;
        self
    }

    /// Truncates to [`MAX_PROMPT_AGENTS`] and attaches cards to agents that
    /// did not bring one inline.
    pub fn enrich(&self, agents: Vec<AgentWithCard>) -> Vec<AgentWithCard> {
        attach_cards(self.cards.as_ref(), agents)
    }

    /// Prompt that [`rank`](Self::rank) would send for this input.
    pub fn prompt_for(&self, query: &str, agents: Vec<AgentWithCard>) -> String {
        build_match_prompt(query.trim(), &self.enrich(agents))
    }

    /// [`enrich`](Self::enrich) on the blocking pool; card providers may do file I/O.
    async fn enrich_off_runtime(
        &self,
        agents: Vec<AgentWithCard>,
    ) -> Result<Vec<AgentWithCard>, PipelineError> {
        let cards = Arc::clone(&self.cards);
        tokio::task::spawn_blocking(move || attach_cards(cards.as_ref(), agents))
            .await
            .map_err(|e| PipelineError::Internal(format!("card lookup task failed: {e}")))
    }

    /// Ranks `agents` against `query`.
    ///
    /// An empty agent list short-circuits to no matches without calling the
    /// model. A completion with no usable payload also yields no matches.
    pub async fn rank(
        &self,
        query: &str,
        agents: Vec<AgentWithCard>,
    ) -> Result<Vec<MatchResult>, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidInput("Missing query".to_string()));
        }
        if agents.is_empty() {
            return Ok(Vec::new());
        }
        self.invoker.ensure_configured()?;

        let supplied = agents.len();
        let agents = self.enrich_off_runtime(agents).await?;
        let prompt = build_match_prompt(query, &agents);
        tracing::info!(
            agents = supplied.min(MAX_PROMPT_AGENTS),
            truncated = supplied > MAX_PROMPT_AGENTS,
            model = self.invoker.model(),
            temperature = MATCH_TEMPERATURE,
            "ranking agents"
        );
        tracing::debug!(prompt_chars = prompt.len(), "match prompt built");

        let completion = self
            .invoker
            .complete(&ModelRequest::new(MATCH_SYSTEM_PROMPT, prompt, MATCH_TEMPERATURE))
            .await?;

        let matches = extract_matches(&self.parsers, &completion);
        tracing::info!(matches = matches.len(), "ranking complete");
        Ok(matches)
    }
}

fn attach_cards(cards: &dyn SkillCardProvider, agents: Vec<AgentWithCard>) -> Vec<AgentWithCard> {
    agents
        .into_iter()
        .take(MAX_PROMPT_AGENTS)
        .map(|mut agent| {
            if agent.card.is_none() {
                agent.card = cards.card_for(&agent.summary.agent_name);
            }
            agent
        })
        .collect()
}

// ============================================================================
// GraphLayouter
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRequest {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub canvas: CanvasSize,
}

impl LayoutRequest {
    pub fn new(nodes: Vec<GraphNode>) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
            canvas: CanvasSize::default(),
        }
    }

    pub fn with_edges(mut self, edges: Vec<GraphEdge>) -> Self {
        self.edges = edges;
        self
    }

    /// Non-positive or non-finite dimensions fall back to the defaults.
    pub fn with_canvas(mut self, canvas: CanvasSize) -> Self {
        self.canvas = canvas.normalized();
        self
    }
}

pub struct GraphLayouter {
    invoker: Arc<dyn ModelInvoker>,
    parsers: ParserChain,
}

impl GraphLayouter {
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            invoker,
            parsers: ParserChain::standard(),
        }
    }

    pub fn with_parsers(mut self, parsers: ParserChain) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn prompt_for(&self, request: &LayoutRequest) -> String {
        build_layout_prompt(&request.nodes, &request.edges, request.canvas.normalized())
    }

    /// Asks the model for coordinates. Unlike matching, a completion without a
    /// `layout` payload is an error.
    pub async fn layout(&self, request: &LayoutRequest) -> Result<Vec<LayoutPoint>, PipelineError> {
        self.invoker.ensure_configured()?;

        let canvas = request.canvas.normalized();
        let prompt = self.prompt_for(request);
        tracing::info!(
            nodes = request.nodes.len(),
            edges = request.edges.len(),
            width = canvas.width,
            height = canvas.height,
            model = self.invoker.model(),
            temperature = LAYOUT_TEMPERATURE,
            "computing graph layout"
        );

        let completion = self
            .invoker
            .complete(&ModelRequest::new(LAYOUT_SYSTEM_PROMPT, prompt, LAYOUT_TEMPERATURE))
            .await?;

        let points = extract_layout(&self.parsers, &completion, canvas)?;
        if points.len() != request.nodes.len() {
            tracing::warn!(
                nodes = request.nodes.len(),
                points = points.len(),
                "layout point count differs from node count"
            );
        }
        Ok(points)
    }
}
