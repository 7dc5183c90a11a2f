use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::agents::{AgentDefinition, AgentRegistry, AgentSource};
use crate::error::ConfigError;

/// The TOML file structure for delegate.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub runner: Option<RunnerSection>,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RunnerSection {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub max_parallel_tasks: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub grace_period_ms: Option<u64>,
    pub recent_tool_limit: Option<usize>,
    pub temp_dir: Option<String>,
    pub artifact_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub recursive: bool,
}

impl ConfigFile {
    /// Convert to a PartialConfig, tagging every agent with `source`.
    pub fn to_partial(&self, source: AgentSource) -> Result<PartialConfig, ConfigError> {
        let mut partial = PartialConfig::default();

        if let Some(runner) = &self.runner {
            partial.command = runner.command.clone();
            partial.args = runner.args.clone();
            partial.max_parallel_tasks = runner.max_parallel_tasks;
            partial.max_concurrency = runner.max_concurrency;
            partial.grace_period = runner.grace_period_ms.map(Duration::from_millis);
            partial.recent_tool_limit = runner.recent_tool_limit;
            partial.temp_dir = runner.temp_dir.as_ref().map(PathBuf::from);
            partial.artifact_dir = runner.artifact_dir.as_ref().map(PathBuf::from);
        }

        partial.agents = self
            .agents
            .iter()
            .map(|entry| entry.to_definition(source))
            .collect::<Result<_, _>>()?;

        Ok(partial)
    }
}

impl AgentEntry {
    fn to_definition(&self, source: AgentSource) -> Result<AgentDefinition, ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidAgent("agent name is empty".to_string()));
        }
        Ok(AgentDefinition {
            name: name.to_string(),
            source,
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
            tools: self.tools.clone(),
            recursive: self.recursive,
        })
    }
}

/// Fully-resolved runner settings. All fields have values.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Agent executable.
    pub command: String,
    /// Arguments placed before the generated invocation arguments.
    pub args: Vec<String>,
    pub max_parallel_tasks: usize,
    pub max_concurrency: usize,
    /// Delay between SIGTERM and SIGKILL on cancellation.
    pub grace_period: Duration,
    /// Capacity of each task's recent-tool history.
    pub recent_tool_limit: usize,
    /// Root for per-task scratch directories; system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    /// Working directory for tasks that do not name one.
    pub default_working_dir: Option<PathBuf>,
    /// Set when this process was itself launched by a non-recursive agent.
    pub recursion_blocked: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        PartialConfig::default().finalize().runner
    }
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub runner: RunnerConfig,
    pub agents: AgentRegistry,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub max_parallel_tasks: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub grace_period: Option<Duration>,
    pub recent_tool_limit: Option<usize>,
    pub temp_dir: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub default_working_dir: Option<PathBuf>,
    pub agents: Vec<AgentDefinition>,
}
