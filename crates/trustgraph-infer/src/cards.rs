//! Agent-card lookup.
//!
//! Cards enrich the matching prompt with structured skills. The lookup is an
//! injected collaborator so a deployment without card storage uses
//! [`NoSkillCards`] explicitly instead of a silently disabled code path.

use std::io;
use std::path::{Path, PathBuf};

use crate::model::AgentCard;

pub trait SkillCardProvider: Send + Sync {
    /// Card for the agent with this registry name, if one is known.
    fn card_for(&self, agent_name: &str) -> Option<AgentCard>;
}

/// Never has a card. Every agent renders as "no skills documented".
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSkillCards;

impl SkillCardProvider for NoSkillCards {
    fn card_for(&self, _agent_name: &str) -> Option<AgentCard> {
        None
    }
}

/// Reads `<dir>/<agentName>.json` on each lookup.
#[derive(Debug, Clone)]
pub struct DirectorySkillCards {
    dir: PathBuf,
}

impl DirectorySkillCards {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn card_path(&self, agent_name: &str) -> Option<PathBuf> {
        let name = agent_name.trim();
        let safe = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        safe.then(|| self.dir.join(format!("{name}.json")))
    }
}

impl SkillCardProvider for DirectorySkillCards {
    fn card_for(&self, agent_name: &str) -> Option<AgentCard> {
        let path = self.card_path(agent_name)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read agent card");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(card) => Some(card),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse agent card");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn noop_provider_has_no_cards() {
        assert_eq!(NoSkillCards.card_for("anything"), None);
    }

    #[test]
    fn reads_card_by_agent_name() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("translator.json"),
            r#"{"name":"translator","skills":[{"name":"Translate","tags":["i18n"],"inputModes":["text"]}]}"#,
        )
        .unwrap();

        let cards = DirectorySkillCards::new(dir.path());
        let card = cards.card_for("translator").expect("card present");
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].name.as_deref(), Some("Translate"));
        assert_eq!(card.skills[0].input_modes, vec!["text".to_string()]);
    }

    #[test]
    fn missing_or_broken_cards_degrade_to_none() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();

        let cards = DirectorySkillCards::new(dir.path());
        assert_eq!(cards.card_for("absent"), None);
        assert_eq!(cards.card_for("broken"), None);
    }

    #[test]
    fn rejects_names_that_escape_the_directory() {
        let cards = DirectorySkillCards::new("/tmp/cards");
        assert_eq!(cards.card_path("../etc/passwd"), None);
        assert_eq!(cards.card_path("a/b"), None);
        assert_eq!(cards.card_path(".hidden"), None);
        assert_eq!(cards.card_path(""), None);
        assert_eq!(
            cards.card_path("weather"),
            Some(PathBuf::from("/tmp/cards/weather.json"))
        );
    }
}
