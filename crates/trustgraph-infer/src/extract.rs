//! Recovering structured results from free-text completions.
//!
//! Models wrap JSON in prose or markdown fences often enough that a single
//! `serde_json::from_str` is not enough. Parsing goes through a
//! [`ParserChain`]: each [`ResponseParser`] strategy is tried in order and the
//! first candidate the caller accepts wins.
//!
//! Matching never fails: no usable payload degrades to an empty list. Layout
//! extraction reports [`ExtractError`] since an empty layout is not usable.

use regex::Regex;
use serde_json::Value;

use crate::error::ExtractError;
use crate::model::{scalar_to_string, CanvasSize, LayoutPoint, MatchResult};

/// Hard cap on returned matches, whatever the model sends.
pub const MAX_MATCH_RESULTS: usize = 50;
/// Score used when the model omits `trustScore` or sends a non-number.
pub const DEFAULT_TRUST_SCORE: u8 = 50;

pub const MATCHES_FIELD: &str = "matches";
pub const LAYOUT_FIELD: &str = "layout";

/// One way of pulling a JSON value out of completion text.
pub trait ResponseParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate values in preference order. Empty when the strategy finds nothing.
    fn candidates(&self, text: &str) -> Vec<Value>;
}

/// The whole completion is JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictJson;

impl ResponseParser for StrictJson {
    fn name(&self) -> &'static str {
        "strict-json"
    }

    fn candidates(&self, text: &str) -> Vec<Value> {
        serde_json::from_str(text.trim()).into_iter().collect()
    }
}

/// JSON inside markdown code fences (```json ... ``` or bare ```).
#[derive(Debug, Clone)]
pub struct FencedCodeBlock {
    fence: Regex,
}

impl FencedCodeBlock {
    const PATTERN: &'static str = r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```";

    pub fn new() -> Self {
        Self {
            fence: Regex::new(Self::PATTERN).expect("fence pattern is a valid regex"),
        }
    }
}

impl Default for FencedCodeBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser for FencedCodeBlock {
    fn name(&self) -> &'static str {
        "fenced-code-block"
    }

    fn candidates(&self, text: &str) -> Vec<Value> {
        self.fence
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter_map(|m| serde_json::from_str(m.as_str().trim()).ok())
            .collect()
    }
}

/// Widest greedy span from the first `{` to the last `}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WidestBraceSpan;

impl WidestBraceSpan {
    pub fn span(text: &str) -> Option<&str> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (end > start).then(|| &text[start..=end])
    }
}

impl ResponseParser for WidestBraceSpan {
    fn name(&self) -> &'static str {
        "widest-brace-span"
    }

    fn candidates(&self, text: &str) -> Vec<Value> {
        Self::span(text)
            .and_then(|span| serde_json::from_str(span).ok())
            .into_iter()
            .collect()
    }
}

/// Ordered list of strategies.
pub struct ParserChain {
    parsers: Vec<Box<dyn ResponseParser>>,
}

impl ParserChain {
    pub fn new(parsers: Vec<Box<dyn ResponseParser>>) -> Self {
        Self { parsers }
    }

    /// Strict JSON, then fenced code blocks, then the widest brace span.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(StrictJson),
            Box::new(FencedCodeBlock::new()),
            Box::new(WidestBraceSpan),
        ])
    }

    /// First candidate, across strategies in order, that `accept` approves.
    pub fn find<F>(&self, text: &str, accept: F) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        for parser in &self.parsers {
            if let Some(v) = parser.candidates(text).into_iter().find(|v| accept(v)) {
                tracing::debug!(strategy = parser.name(), "recovered JSON payload");
                return Some(v);
            }
        }
        None
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Matches
// ============================================================================

/// Recovers ranked matches from a completion. Never fails.
///
/// At most [`MAX_MATCH_RESULTS`] entries are returned.
pub fn extract_matches(chain: &ParserChain, text: &str) -> Vec<MatchResult> {
    let Some(payload) = chain.find(text, |v| v.get(MATCHES_FIELD).is_some_and(Value::is_array))
    else {
        tracing::warn!(chars = text.len(), "no matches payload in completion; returning empty");
        return Vec::new();
    };

    payload[MATCHES_FIELD]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(coerce_match)
                .take(MAX_MATCH_RESULTS)
                .collect()
        })
        .unwrap_or_default()
}

/// Field-level coercion of one `matches` element.
///
/// Accepts objects with an `agentId` (string or number) or bare identifiers.
/// Elements without a usable id are dropped.
fn coerce_match(item: &Value) -> Option<MatchResult> {
    let agent_id = match item {
        Value::Object(obj) => obj.get("agentId").and_then(scalar_to_string),
        other => scalar_to_string(other),
    }?;
    let agent_id = agent_id.trim().to_string();
    if agent_id.is_empty() {
        return None;
    }

    let trust_score = item
        .get("trustScore")
        .and_then(Value::as_f64)
        .map(clamp_score)
        .unwrap_or(DEFAULT_TRUST_SCORE);

    let reasoning = item
        .get("reasoning")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    Some(MatchResult {
        agent_id,
        trust_score,
        reasoning,
    })
}

fn clamp_score(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// Layout
// ============================================================================

/// Recovers layout points from a completion.
///
/// Points without an id or numeric coordinates are dropped; coordinates are
/// clamped into the canvas, after degenerate dimensions fall back to the
/// defaults. A `null` layout yields an empty list.
pub fn extract_layout(
    chain: &ParserChain,
    text: &str,
    canvas: CanvasSize,
) -> Result<Vec<LayoutPoint>, ExtractError> {
    let canvas = canvas.normalized();
    let payload = chain
        .find(text, |v| v.get(LAYOUT_FIELD).is_some())
        .ok_or(ExtractError::NoPayload {
            field: LAYOUT_FIELD,
        })?;

    match &payload[LAYOUT_FIELD] {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| coerce_point(item, canvas))
            .collect()),
        other => Err(ExtractError::Malformed {
            field: LAYOUT_FIELD,
            reason: format!("expected an array, got {}", json_kind(other)),
        }),
    }
}

fn coerce_point(item: &Value, canvas: CanvasSize) -> Option<LayoutPoint> {
    let id = item.get("id").and_then(scalar_to_string)?;
    let x = item.get("x").and_then(Value::as_f64)?;
    let y = item.get("y").and_then(Value::as_f64)?;
    Some(LayoutPoint {
        id,
        x: x.clamp(0.0, canvas.width),
        y: y.clamp(0.0, canvas.height),
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn matches(text: &str) -> Vec<MatchResult> {
        extract_matches(&ParserChain::standard(), text)
    }

    #[test]
    fn strict_json_matches() {
        let got = matches(r#"{"matches":[{"agentId":"a1","trustScore":80}]}"#);
        assert_eq!(
            got,
            vec![MatchResult {
                agent_id: "a1".into(),
                trust_score: 80,
                reasoning: None
            }]
        );
    }

    #[test]
    fn fenced_json_with_commentary_gets_default_score() {
        let got = matches("Sure! ```json\n{\"matches\":[{\"agentId\":\"a2\"}]}\n```");
        assert_eq!(
            got,
            vec![MatchResult {
                agent_id: "a2".into(),
                trust_score: DEFAULT_TRUST_SCORE,
                reasoning: None
            }]
        );
    }

    #[test]
    fn prose_without_json_yields_empty() {
        assert!(matches("I cannot help with that").is_empty());
        assert!(matches("").is_empty());
        assert!(matches("{ not json }").is_empty());
    }

    #[test]
    fn salvages_widest_span_from_prose() {
        let got = matches(
            r#"Here you go: {"matches":[{"agentId":"a3","trustScore":61,"reasoning":"solid"}]} hope it helps"#,
        );
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].agent_id, "a3");
        assert_eq!(got[0].reasoning.as_deref(), Some("solid"));
    }

    #[test]
    fn strict_object_without_matches_array_is_rejected() {
        assert!(matches(r#"{"matches":"a1"}"#).is_empty());
        assert!(matches(r#"{"results":[{"agentId":"a1"}]}"#).is_empty());
    }

    #[test]
    fn coerces_elements() {
        let got = matches(
            r#"{"matches":[
                "bare-id",
                7,
                {"agentId": 12, "trustScore": "90"},
                {"agentId": "", "trustScore": 99},
                {"trustScore": 99},
                {"agentId": "  "},
                {"agentId": "hi", "trustScore": 250, "reasoning": ""},
                {"agentId": "lo", "trustScore": -4, "reasoning": {"why": 1}},
                {"agentId": "frac", "trustScore": 72.6},
                null
            ]}"#,
        );
        let ids: Vec<_> = got.iter().map(|m| m.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["bare-id", "7", "12", "hi", "lo", "frac"]);

        assert_eq!(got[2].trust_score, DEFAULT_TRUST_SCORE);
        assert_eq!(got[3].trust_score, 100);
        assert_eq!(got[3].reasoning, None);
        assert_eq!(got[4].trust_score, 0);
        assert_eq!(got[4].reasoning, None);
        assert_eq!(got[5].trust_score, 73);
    }

    #[test]
    fn caps_at_fifty() {
        let items: Vec<_> = (0..80)
            .map(|i| json!({ "agentId": format!("a{i}"), "trustScore": 70 }))
            .collect();
        let text = json!({ "matches": items }).to_string();
        let got = matches(&text);
        assert_eq!(got.len(), MAX_MATCH_RESULTS);
        assert_eq!(got[0].agent_id, "a0");
        assert_eq!(got[49].agent_id, "a49");
    }

    #[test]
    fn cap_applies_after_dropping_invalid_elements() {
        let mut items = vec![json!({ "agentId": "" }); 10];
        items.extend((0..60).map(|i| json!({ "agentId": format!("a{i}") })));
        let got = matches(&json!({ "matches": items }).to_string());
        assert_eq!(got.len(), MAX_MATCH_RESULTS);
        assert_eq!(got[0].agent_id, "a0");
    }

    #[test]
    fn fenced_parser_reads_every_block() {
        let text = "```\nnot json\n```\nthen\n```json\n{\"a\":1}\n```";
        let got = FencedCodeBlock::new().candidates(text);
        assert_eq!(got, vec![json!({ "a": 1 })]);
    }

    #[test]
    fn chain_order_is_respected() {
        struct Fixed(&'static str, Value);
        impl ResponseParser for Fixed {
            fn name(&self) -> &'static str {
                self.0
            }
            fn candidates(&self, _text: &str) -> Vec<Value> {
                vec![self.1.clone()]
            }
        }

        let chain = ParserChain::new(vec![
            Box::new(Fixed("first", json!({ "matches": [{ "agentId": "from-first" }] }))),
            Box::new(Fixed("second", json!({ "matches": [{ "agentId": "from-second" }] }))),
        ]);
        assert_eq!(extract_matches(&chain, "")[0].agent_id, "from-first");
        assert!(extract_matches(&ParserChain::new(Vec::new()), r#"{"matches":[]}"#).is_empty());
    }

    #[test]
    fn widest_span_needs_ordered_braces() {
        assert_eq!(WidestBraceSpan::span("} backwards {"), None);
        assert_eq!(WidestBraceSpan::span("x {a} y {b} z"), Some("{a} y {b}"));
    }

    const CANVAS: CanvasSize = CanvasSize {
        width: 600.0,
        height: 400.0,
    };

    #[test]
    fn layout_from_prose_wrapped_json() {
        let text = r#"Layout below:
{"layout": [{"id": "n1", "x": 100, "y": 50.5}, {"id": 2, "x": 700, "y": -10}]}
Done."#;
        let got = extract_layout(&ParserChain::standard(), text, CANVAS).unwrap();
        assert_eq!(
            got,
            vec![
                LayoutPoint { id: "n1".into(), x: 100.0, y: 50.5 },
                LayoutPoint { id: "2".into(), x: 600.0, y: 0.0 },
            ]
        );
    }

    #[test]
    fn layout_drops_points_without_coordinates() {
        let text = r#"{"layout":[{"id":"a","x":1,"y":2},{"id":"b","x":"1","y":2},{"x":1,"y":1}]}"#;
        let got = extract_layout(&ParserChain::standard(), text, CANVAS).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "a");
    }

    #[test]
    fn layout_clamps_against_default_canvas_when_dimensions_are_degenerate() {
        let text = r#"{"layout":[{"id":"a","x":750,"y":-3}]}"#;
        for canvas in [
            CanvasSize { width: -5.0, height: 400.0 },
            CanvasSize { width: f64::NAN, height: f64::NAN },
            CanvasSize { width: 0.0, height: -1.0 },
        ] {
            let got = extract_layout(&ParserChain::standard(), text, canvas).unwrap();
            assert_eq!(got, vec![LayoutPoint { id: "a".into(), x: 600.0, y: 0.0 }]);
        }
    }

    #[test]
    fn layout_missing_is_an_error() {
        let err = extract_layout(&ParserChain::standard(), "no idea", CANVAS).unwrap_err();
        assert!(matches!(err, ExtractError::NoPayload { field: "layout" }));

        let err =
            extract_layout(&ParserChain::standard(), r#"{"nodes":[]}"#, CANVAS).unwrap_err();
        assert!(matches!(err, ExtractError::NoPayload { .. }));
    }

    #[test]
    fn layout_null_is_empty_and_scalar_is_malformed() {
        assert!(extract_layout(&ParserChain::standard(), r#"{"layout":null}"#, CANVAS)
            .unwrap()
            .is_empty());
        let err =
            extract_layout(&ParserChain::standard(), r#"{"layout":"circle"}"#, CANVAS).unwrap_err();
        assert!(matches!(err, ExtractError::Malformed { .. }));
    }

    proptest! {
        #[test]
        fn extraction_never_panics_on_arbitrary_text(text in "\\PC{0,400}") {
            let got = matches(&text);
            prop_assert!(got.len() <= MAX_MATCH_RESULTS);
            let _ = extract_layout(&ParserChain::standard(), &text, CANVAS);
        }

        #[test]
        fn scores_stay_in_range(scores in proptest::collection::vec(-1.0e6f64..1.0e6, 0..80)) {
            let items: Vec<_> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| json!({ "agentId": format!("a{i}"), "trustScore": s }))
                .collect();
            let got = matches(&json!({ "matches": items }).to_string());
            prop_assert_eq!(got.len(), scores.len().min(MAX_MATCH_RESULTS));
            for m in got {
                prop_assert!(m.trust_score <= 100);
            }
        }
    }
}
