//! Request-scoped data model.
//!
//! Everything here is constructed per request and dropped once the reply is
//! sent. Field names follow the JSON wire format (camelCase).

use serde::{Deserialize, Deserializer, Serialize};

/// Identity plus free-text description of a registered agent.
///
/// The description is expected to embed feedback and trust-graph commentary as
/// prose; it is passed to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "string_or_number_or_null")]
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structured capability descriptor from an agent card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSkill {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
    pub input_modes: Vec<String>,
    pub output_modes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub skills: Vec<AgentSkill>,
}

/// The unit serialized into the matching prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWithCard {
    #[serde(flatten)]
    pub summary: AgentSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<AgentCard>,
}

impl AgentWithCard {
    pub fn new(summary: AgentSummary) -> Self {
        Self {
            summary,
            card: None,
        }
    }

    pub fn with_card(mut self, card: AgentCard) -> Self {
        self.card = Some(card);
        self
    }

    pub fn skills(&self) -> &[AgentSkill] {
        self.card.as_ref().map(|c| c.skills.as_slice()).unwrap_or(&[])
    }
}

impl From<AgentSummary> for AgentWithCard {
    fn from(summary: AgentSummary) -> Self {
        Self::new(summary)
    }
}

/// One ranked agent.
///
/// `agent_id` is never empty and `trust_score` is always within `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub agent_id: String,
    pub trust_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number_or_null")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(deserialize_with = "string_or_number")]
    pub from: String,
    #[serde(deserialize_with = "string_or_number")]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub const DEFAULT_WIDTH: f64 = 600.0;
    pub const DEFAULT_HEIGHT: f64 = 400.0;

    /// Falls back to the default dimension for anything missing or non-positive.
    pub fn from_optional(width: Option<f64>, height: Option<f64>) -> Self {
        let pick = |v: Option<f64>, default: f64| match v {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => default,
        };
        Self {
            width: pick(width, Self::DEFAULT_WIDTH),
            height: pick(height, Self::DEFAULT_HEIGHT),
        }
    }

    /// Same fallback as [`from_optional`](Self::from_optional), applied to a
    /// canvas built directly from its public fields.
    pub fn normalized(self) -> Self {
        Self::from_optional(Some(self.width), Some(self.height))
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
        }
    }
}

/// One positioned node in a computed layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Renders a JSON scalar the way the registry front-end does: strings as-is,
/// numbers and booleans via their textual form. Anything else yields `None`.
pub(crate) fn scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(&v)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number, got {v}")))
}

fn string_or_number_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    if v.is_null() {
        return Ok(String::new());
    }
    scalar_to_string(&v)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number, got {v}")))
}
