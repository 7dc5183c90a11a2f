//! Resolved agent definitions and the catalog the supervisor looks them up in.

use std::collections::BTreeMap;

use serde::Serialize;

/// Where an agent definition came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    /// The user's global configuration.
    User,
    /// The project's configuration.
    Project,
    #[default]
    Unknown,
}

/// Everything needed to launch a named agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub source: AgentSource,
    /// Appended to the agent's own system prompt; empty means none.
    pub system_prompt: String,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    /// Whether this agent may itself delegate to further agents.
    pub recursive: bool,
}

impl AgentDefinition {
    /// A definition with no prompt, model, or tool restrictions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: AgentSource::Unknown,
            system_prompt: String::new(),
            model: None,
            tools: None,
            recursive: false,
        }
    }
}

/// Name-based lookup of agent definitions.
pub trait AgentCatalog: Send + Sync {
    fn resolve(&self, name: &str) -> Option<AgentDefinition>;

    /// All known agent names, sorted.
    fn names(&self) -> Vec<String>;
}

/// In-memory catalog keyed by agent name.
///
/// Later registrations replace earlier ones with the same name, so project
/// agents registered after user agents take precedence.
#[derive(Clone, Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: AgentDefinition) -> Option<AgentDefinition> {
        self.agents.insert(agent.name.clone(), agent)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl FromIterator<AgentDefinition> for AgentRegistry {
    fn from_iter<I: IntoIterator<Item = AgentDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for agent in iter {
            registry.insert(agent);
        }
        registry
    }
}

impl AgentCatalog for AgentRegistry {
    fn resolve(&self, name: &str) -> Option<AgentDefinition> {
        self.agents.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_definitions_override_earlier_ones() {
        let mut user = AgentDefinition::new("scout");
        user.source = AgentSource::User;
        let mut project = AgentDefinition::new("scout");
        project.source = AgentSource::Project;
        project.model = Some("haiku".into());

        let registry: AgentRegistry = [user, project, AgentDefinition::new("planner")]
            .into_iter()
            .collect();

        assert_eq!(registry.len(), 2);
        let scout = registry.resolve("scout").unwrap();
        assert_eq!(scout.source, AgentSource::Project);
        assert_eq!(scout.model.as_deref(), Some("haiku"));
        assert_eq!(registry.names(), vec!["planner", "scout"]);
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let registry = AgentRegistry::new();
        assert!(registry.resolve("ghost").is_none());
        assert!(registry.is_empty());
    }
}
