//! Prompt construction for both pipelines.
//!
//! Builders are pure: same input, byte-identical output. No timestamps, no
//! randomness, no network.

use serde::Serialize;

use crate::model::{AgentSkill, AgentWithCard, CanvasSize, GraphEdge, GraphNode};

/// Agents beyond this many are silently dropped from the prompt.
pub const MAX_PROMPT_AGENTS: usize = 200;

pub const NO_DESCRIPTION: &str = "No description available";
pub const NO_SKILLS_MARKER: &str = "no skills documented";

pub const MATCH_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that responds with strict JSON only.";
pub const LAYOUT_SYSTEM_PROMPT: &str =
    "You are a graph visualization expert. Respond only with valid JSON.";

/// Minimum spacing between nodes requested from the model (canvas units).
pub const LAYOUT_MIN_SPACING: u32 = 40;
/// Margin to keep free along every canvas edge (canvas units).
pub const LAYOUT_MARGIN: u32 = 30;

const MATCH_HEADER: &str = r#"You are a trust and routing assistant. Given a user query and a list of agents (with names, descriptions, and skills from their agent cards), analyze each agent and return:
1. The IDs of agents that best match the query (sorted by relevance)
2. A trust score (0-100) for each matched agent based on:
   - Quality and sentiment of feedback mentioned in their descriptions
   - Strength and credibility of their relationship network
   - Consistency and reliability indicators
   - Relevance and specificity of their skills to the query

Respond ONLY with JSON in the exact shape:
{
  "matches": [
    { "agentId": "<id>", "trustScore": <0-100>, "reasoning": "<brief explanation>" },
    ...
  ]
}

CRITICAL Guidelines:
- ONLY include agents whose skills directly match or are relevant to the query
- If an agent's skills don't fit the query, EXCLUDE them completely from results
- Prefer agents with specific, well-documented skills that address the query
- Higher trust scores for agents with positive feedback, strong relationships, credible networks, AND relevant skills
- Include up to 10 matches. If none fit, return an empty array
- Do not add commentary or code blocks, just JSON"#;

/// Builds the agent-matching prompt.
///
/// Agents are listed in input order with a 1-based index; only the first
/// [`MAX_PROMPT_AGENTS`] are included.
pub fn build_match_prompt(query: &str, agents: &[AgentWithCard]) -> String {
    let list = agents
        .iter()
        .take(MAX_PROMPT_AGENTS)
        .enumerate()
        .map(|(i, agent)| render_agent(i + 1, agent))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{MATCH_HEADER}\n\nUser Query:\n{query}\n\nAgents:\n{list}")
}

fn render_agent(index: usize, agent: &AgentWithCard) -> String {
    let summary = &agent.summary;
    let description = summary.description.as_deref().unwrap_or(NO_DESCRIPTION);

    let mut parts = vec![
        format!(
            "#{index} id={} name={}",
            summary.agent_id, summary.agent_name
        ),
        format!("Description (includes feedback & trust graph):\n{description}"),
    ];

    let skills = agent.skills();
    if skills.is_empty() {
        parts.push(format!("Skills: {NO_SKILLS_MARKER}"));
    } else {
        let rendered = skills
            .iter()
            .enumerate()
            .map(|(i, skill)| render_skill(i + 1, skill))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Skills:\n{rendered}"));
    }

    parts.join("\n")
}

fn render_skill(index: usize, skill: &AgentSkill) -> String {
    let mut lines = vec![format!("  Skill {index}:")];
    if let Some(name) = non_empty(skill.name.as_deref()) {
        lines.push(format!("    Name: {name}"));
    }
    if let Some(description) = non_empty(skill.description.as_deref()) {
        lines.push(format!("    Description: {description}"));
    }
    if !skill.tags.is_empty() {
        lines.push(format!("    Tags: {}", skill.tags.join(", ")));
    }
    if !skill.examples.is_empty() {
        lines.push(format!("    Examples: {}", skill.examples.join("; ")));
    }
    if !skill.input_modes.is_empty() {
        lines.push(format!("    Input modes: {}", skill.input_modes.join(", ")));
    }
    if !skill.output_modes.is_empty() {
        lines.push(format!("    Output modes: {}", skill.output_modes.join(", ")));
    }
    lines.join("\n")
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphDescription<'a> {
    nodes: &'a [GraphNode],
    edges: &'a [GraphEdge],
    canvas_size: CanvasSize,
}

/// Builds the layout prompt. The spacing/margin constraints are instructions
/// to the model; enforcement happens in extraction (clamping only).
pub fn build_layout_prompt(nodes: &[GraphNode], edges: &[GraphEdge], canvas: CanvasSize) -> String {
    let description = GraphDescription {
        nodes,
        edges,
        canvas_size: canvas,
    };
    // Plain data structs; serialization cannot fail.
    let graph = serde_json::to_string_pretty(&description).unwrap_or_default();
    let (width, height) = (canvas.width, canvas.height);

    format!(
        r#"You are a graph layout expert. Given this trust graph, generate optimal 2D coordinates for each node to create a clear, well-spread visualization.

Graph data:
{graph}

Requirements:
- Spread nodes evenly across the {width}x{height} canvas
- Keep connected nodes reasonably close but not overlapping
- Central/important nodes (with many connections) should be more central
- Avoid node overlap (min {LAYOUT_MIN_SPACING}px spacing)
- Keep all nodes within bounds with {LAYOUT_MARGIN}px margin

Respond ONLY with JSON in this exact format:
{{
  "layout": [
    {{"id": "node_id", "x": number, "y": number}},
    ...
  ]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentCard, AgentSummary};
    use proptest::prelude::*;

    fn agent(id: &str, name: &str, description: Option<&str>) -> AgentWithCard {
        AgentWithCard::new(AgentSummary {
            agent_id: id.to_string(),
            agent_name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    #[test]
    fn lists_agents_in_order_with_one_based_index() {
        let prompt = build_match_prompt(
            "translate documents",
            &[
                agent("id-alpha", "Alpha", Some("Great feedback")),
                agent("id-beta", "Beta", None),
            ],
        );

        let alpha = prompt.find("#1 id=id-alpha name=Alpha").expect("alpha listed");
        let beta = prompt.find("#2 id=id-beta name=Beta").expect("beta listed");
        assert!(alpha < beta);
        assert!(prompt.contains("User Query:\ntranslate documents\n"));
        assert!(prompt.contains("Great feedback"));
        assert!(prompt.contains(NO_DESCRIPTION));
    }

    #[test]
    fn agent_without_skills_gets_marker_only() {
        let prompt = build_match_prompt("q", &[agent("a1", "Solo", None)]);
        assert!(prompt.contains("Skills: no skills documented"));
        assert!(!prompt.contains("Skill 1:"));
    }

    #[test]
    fn skills_render_present_fields_only() {
        let card = AgentCard {
            skills: vec![
                AgentSkill {
                    name: Some("Summarize".into()),
                    tags: vec!["nlp".into(), "text".into()],
                    examples: vec!["summarize this".into(), "tl;dr".into()],
                    ..AgentSkill::default()
                },
                AgentSkill {
                    description: Some("Translates prose".into()),
                    ..AgentSkill::default()
                },
            ],
            ..AgentCard::default()
        };
        let prompt = build_match_prompt("q", &[agent("a1", "Writer", None).with_card(card)]);

        assert!(prompt.contains("  Skill 1:\n    Name: Summarize\n    Tags: nlp, text\n    Examples: summarize this; tl;dr"));
        assert!(prompt.contains("  Skill 2:\n    Description: Translates prose"));
        assert!(!prompt.contains(NO_SKILLS_MARKER));
        assert!(!prompt.contains("Skill 2:\n    Name"));
    }

    #[test]
    fn truncates_to_max_agents() {
        let agents: Vec<_> = (0..MAX_PROMPT_AGENTS + 5)
            .map(|i| agent(&format!("agent-{i:04}"), &format!("Name{i:04}"), None))
            .collect();
        let prompt = build_match_prompt("q", &agents);

        assert!(prompt.contains(&format!("#{MAX_PROMPT_AGENTS} id=agent-0199")));
        assert!(!prompt.contains("agent-0200"));
        assert!(!prompt.contains(&format!("#{} ", MAX_PROMPT_AGENTS + 1)));
    }

    #[test]
    fn header_fixes_output_contract() {
        let prompt = build_match_prompt("q", &[agent("a1", "A", None)]);
        assert!(prompt.contains(r#""matches""#));
        assert!(prompt.contains("If none fit, return an empty array"));
        assert!(prompt.contains("Do not add commentary or code blocks, just JSON"));
    }

    #[test]
    fn layout_prompt_embeds_graph_and_constraints() {
        let nodes = vec![
            GraphNode { id: "n1".into(), label: "Alice".into() },
            GraphNode { id: "n2".into(), label: "Bob".into() },
        ];
        let edges = vec![GraphEdge { from: "n1".into(), to: "n2".into(), weight: None }];
        let prompt = build_layout_prompt(&nodes, &edges, CanvasSize { width: 800.0, height: 500.0 });

        assert!(prompt.contains(r#""canvasSize""#));
        assert!(prompt.contains(r#""label": "Alice""#));
        assert!(!prompt.contains(r#""weight""#));
        assert!(prompt.contains("800x500 canvas"));
        assert!(prompt.contains("min 40px spacing"));
        assert!(prompt.contains("30px margin"));
        assert!(prompt.contains(r#""layout": ["#));
    }

    proptest! {
        #[test]
        fn match_prompt_is_deterministic_and_ordered(
            names in proptest::collection::vec("[A-Z][a-z]{3,8}", 1..20),
            query in "[a-z ]{1,40}",
        ) {
            let agents: Vec<_> = names
                .iter()
                .enumerate()
                .map(|(i, n)| agent(&format!("agent-{i:03}"), n, None))
                .collect();

            let first = build_match_prompt(&query, &agents);
            let second = build_match_prompt(&query, &agents);
            prop_assert_eq!(&first, &second);

            let mut last = 0;
            for (i, a) in agents.iter().enumerate() {
                let line = format!("#{} id={} name={}", i + 1, a.summary.agent_id, a.summary.agent_name);
                let pos = first.find(&line);
                prop_assert!(pos.is_some());
                let pos = pos.unwrap();
                prop_assert!(pos >= last);
                prop_assert_eq!(first.matches(&format!("id={} ", a.summary.agent_id)).count(), 1);
                last = pos;
            }
        }
    }
}
