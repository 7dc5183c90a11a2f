//! Type definitions for the orchestration subsystem.
//!
//! These types form the shared vocabulary between the
//! [`super::Orchestrator`], the [`crate::exec::ProcessSupervisor`], and
//! whatever renders progress for the caller. Everything a caller receives
//! derives [`serde::Serialize`] so it can be emitted as JSON.

use std::path::PathBuf;

use serde::Serialize;

use crate::agents::AgentSource;
use crate::protocol::{AgentMessage, MessageUsage, StopReason, final_assistant_text};

/// `stderr_text` of a task that was cancelled before it exited on its own.
pub const INTERRUPTED: &str = "Interrupted";

/// Placeholder text for a task that produced nothing at all.
pub const NO_OUTPUT: &str = "(no output)";

/// One unit of delegated work. Never mutated by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSpec {
    pub agent_name: String,
    pub task_text: String,
    pub working_dir: Option<PathBuf>,
    /// Takes precedence over the agent's configured model.
    pub model_override: Option<String>,
    /// Position within a chain, for chain steps.
    pub step_index: Option<usize>,
}

impl TaskSpec {
    pub fn new(agent_name: impl Into<String>, task_text: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_text: task_text.into(),
            working_dir: None,
            model_override: None,
            step_index: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

/// Accumulated token, cost, and turn counts for one task.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
    /// Context size reported by the most recent assistant message.
    pub context_tokens: u64,
    pub turns: u64,
}

impl UsageStats {
    /// Account for one assistant message.
    pub fn record_assistant_turn(&mut self, usage: Option<&MessageUsage>) {
        self.turns += 1;
        if let Some(usage) = usage {
            self.input_tokens += usage.input;
            self.output_tokens += usage.output;
            self.cache_read_tokens += usage.cache_read;
            self.cache_write_tokens += usage.cache_write;
            self.cost_usd += usage.cost.total;
            self.context_tokens = usage.total_tokens;
        }
    }

    pub fn tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// How a finished task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Completed,
    Failed,
    /// Cancelled by the caller; distinct from a genuine failure.
    Interrupted,
}

/// Everything observed about one agent invocation.
///
/// Owned by a single supervisor while the process runs and handed back by
/// value once it has exited.
#[derive(Clone, Debug, Serialize)]
pub struct TaskResult {
    pub agent_name: String,
    pub agent_source: AgentSource,
    pub task_text: String,
    /// Exit code of the agent process; `-1` until the exit is observed.
    pub exit_code: i32,
    pub messages: Vec<AgentMessage>,
    pub stderr_text: String,
    pub usage: UsageStats,
    pub resolved_model: Option<String>,
    pub stop_reason: Option<StopReason>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub step_index: Option<usize>,
    /// Set when cancellation arrived before the process exited on its own.
    pub interrupted: bool,
}

impl TaskResult {
    /// A result for `spec` whose process has not exited yet.
    pub fn pending(spec: &TaskSpec, agent_source: AgentSource) -> Self {
        Self {
            agent_name: spec.agent_name.clone(),
            agent_source,
            task_text: spec.task_text.clone(),
            exit_code: -1,
            messages: Vec::new(),
            stderr_text: String::new(),
            usage: UsageStats::default(),
            resolved_model: None,
            stop_reason: None,
            error_message: None,
            duration_ms: 0,
            step_index: spec.step_index,
            interrupted: false,
        }
    }

    /// Text of the last assistant message, if any.
    pub fn final_output(&self) -> Option<&str> {
        final_assistant_text(&self.messages)
    }

    /// A non-zero exit, an error/aborted stop reason, or a cancellation.
    pub fn is_error(&self) -> bool {
        self.interrupted
            || self.exit_code != 0
            || self.stop_reason.is_some_and(StopReason::is_failure)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn outcome(&self) -> TaskOutcome {
        if self.is_interrupted() {
            TaskOutcome::Interrupted
        } else if self.is_error() {
            TaskOutcome::Failed
        } else {
            TaskOutcome::Completed
        }
    }

    /// Best explanation of a failure: the agent's error message, then stderr,
    /// then whatever the agent last said.
    pub fn failure_message(&self) -> String {
        [
            self.error_message.as_deref(),
            Some(self.stderr_text.as_str()),
            self.final_output(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(NO_OUTPUT)
        .to_string()
    }

    /// Text persisted to an output file: final output, else stderr.
    pub fn best_output(&self) -> &str {
        self.final_output()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.stderr_text.as_str()).filter(|s| !s.trim().is_empty()))
            .unwrap_or(NO_OUTPUT)
    }
}

/// Lifecycle of one task within a batch. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Point-in-time view of one task, emitted on every meaningful event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub task_index: usize,
    pub agent_name: String,
    pub status: TaskStatus,
    pub current_tool_name: Option<String>,
    pub tool_call_count: u64,
    /// Most recent finished tool names, oldest first.
    pub recent_tools: Vec<String>,
    pub tokens_so_far: u64,
    pub usage: UsageStats,
    pub last_output: Option<String>,
    pub elapsed_ms: u64,
}

impl ProgressRecord {
    /// Initial record for a task that has not started.
    pub fn queued(task_index: usize, agent_name: impl Into<String>) -> Self {
        Self {
            task_index,
            agent_name: agent_name.into(),
            status: TaskStatus::Queued,
            current_tool_name: None,
            tool_call_count: 0,
            recent_tools: Vec::new(),
            tokens_so_far: 0,
            usage: UsageStats::default(),
            last_output: None,
            elapsed_ms: 0,
        }
    }
}

/// Execution topology of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Single,
    Parallel,
    Chain,
}

/// Whole-batch progress, republished on every task update.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSnapshot {
    pub mode: BatchMode,
    pub tasks: Vec<ProgressRecord>,
}

/// Per-run record of what happened, frozen when the run ends.
#[derive(Clone, Debug, Serialize)]
pub struct BatchDetails {
    pub run_id: String,
    pub mode: BatchMode,
    /// RFC 3339 timestamp of the run start.
    pub started_at: String,
    pub results: Vec<TaskResult>,
    pub progress_snapshots: Vec<ProgressRecord>,
    pub output_file_paths: Vec<PathBuf>,
    pub total_duration_ms: u64,
}

/// Sums of [`UsageStats`] across a batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost_usd: f64,
    pub turns: u64,
}

/// The chain step that stopped a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    pub index: usize,
    pub agent_name: String,
}

/// Outcome of one orchestrator run.
#[derive(Clone, Debug, Serialize)]
pub struct BatchResult {
    pub details: BatchDetails,
    /// Single: the task completed. Parallel: always true. Chain: every step completed.
    pub success: bool,
    /// Tasks that exited with code 0.
    pub success_count: usize,
    /// Final output on success, otherwise a short explanation.
    pub text: String,
    pub failed_step: Option<FailedStep>,
    pub usage: UsageTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> TaskResult {
        let mut result = TaskResult::pending(&TaskSpec::new("scout", "look"), AgentSource::User);
        result.exit_code = 0;
        result
    }

    #[test]
    fn pending_result_is_an_error_until_exit() {
        let pending = TaskResult::pending(&TaskSpec::new("scout", "look"), AgentSource::User);
        assert_eq!(pending.exit_code, -1);
        assert!(pending.is_error());
    }

    #[test]
    fn stop_reason_can_fail_a_clean_exit() {
        let mut r = result();
        assert_eq!(r.outcome(), TaskOutcome::Completed);
        r.stop_reason = Some(StopReason::Error);
        assert_eq!(r.outcome(), TaskOutcome::Failed);
    }

    #[test]
    fn interrupted_is_distinct_from_failed() {
        let mut r = result();
        r.exit_code = 143;
        r.interrupted = true;
        assert!(r.is_error());
        assert_eq!(r.outcome(), TaskOutcome::Interrupted);
    }

    #[test]
    fn interrupted_text_on_stderr_is_not_a_cancellation() {
        let mut r = result();
        r.exit_code = 1;
        r.stderr_text = INTERRUPTED.to_string();
        assert!(!r.is_interrupted());
        assert_eq!(r.outcome(), TaskOutcome::Failed);
    }

    #[test]
    fn failure_message_precedence() {
        let mut r = result();
        assert_eq!(r.failure_message(), NO_OUTPUT);

        r.messages.push(AgentMessage::assistant_text("partial answer"));
        assert_eq!(r.failure_message(), "partial answer");

        r.stderr_text = "  boom\n".into();
        assert_eq!(r.failure_message(), "boom");

        r.error_message = Some("rate limited".into());
        assert_eq!(r.failure_message(), "rate limited");
    }

    #[test]
    fn best_output_prefers_final_text() {
        let mut r = result();
        assert_eq!(r.best_output(), NO_OUTPUT);
        r.stderr_text = "warning".into();
        assert_eq!(r.best_output(), "warning");
        r.messages.push(AgentMessage::assistant_text("report"));
        assert_eq!(r.best_output(), "report");
    }

    #[test]
    fn turns_count_every_assistant_message() {
        let mut usage = UsageStats::default();
        usage.record_assistant_turn(None);
        usage.record_assistant_turn(Some(&MessageUsage {
            input: 10,
            output: 4,
            total_tokens: 14,
            ..Default::default()
        }));
        assert_eq!(usage.turns, 2);
        assert_eq!(usage.tokens(), 14);
        assert_eq!(usage.context_tokens, 14);
    }

    #[test]
    fn status_order_is_lifecycle_order() {
        assert!(TaskStatus::Queued < TaskStatus::Running);
        assert!(TaskStatus::Running < TaskStatus::Completed);
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
