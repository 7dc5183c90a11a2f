use super::schema::{AppConfig, PartialConfig, RunnerConfig};
use crate::agents::AgentRegistry;
use std::time::Duration;

pub const DEFAULT_COMMAND: &str = "pi";
pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 8;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_RECENT_TOOL_LIMIT: usize = 5;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For agents: self's definitions replace fallback definitions of the same name.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        let mut agents = fallback.agents;
        agents.extend(self.agents);

        PartialConfig {
            command: self.command.or(fallback.command),
            args: self.args.or(fallback.args),
            max_parallel_tasks: self.max_parallel_tasks.or(fallback.max_parallel_tasks),
            max_concurrency: self.max_concurrency.or(fallback.max_concurrency),
            grace_period: self.grace_period.or(fallback.grace_period),
            recent_tool_limit: self.recent_tool_limit.or(fallback.recent_tool_limit),
            temp_dir: self.temp_dir.or(fallback.temp_dir),
            artifact_dir: self.artifact_dir.or(fallback.artifact_dir),
            default_working_dir: self.default_working_dir.or(fallback.default_working_dir),
            agents,
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let runner = RunnerConfig {
            command: self.command.unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
            args: self.args.unwrap_or_default(),
            max_parallel_tasks: self.max_parallel_tasks.unwrap_or(DEFAULT_MAX_PARALLEL_TASKS),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            grace_period: self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
            recent_tool_limit: self.recent_tool_limit.unwrap_or(DEFAULT_RECENT_TOOL_LIMIT),
            temp_dir: self.temp_dir,
            artifact_dir: self.artifact_dir,
            default_working_dir: self.default_working_dir,
            recursion_blocked: false,
        };

        AppConfig {
            runner,
            agents: self.agents.into_iter().collect::<AgentRegistry>(),
        }
    }
}
