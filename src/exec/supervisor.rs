//! Agent process supervisor.
//!
//! Runs exactly one agent invocation to completion or cancellation and turns
//! its event stream into a [`TaskResult`]. The spawned process:
//! - Runs in its own process group (`process_group(0)`) so signals reach its children
//! - Is killed when the supervising future is dropped (`kill_on_drop(true)`)
//! - Gets SIGTERM on cancellation, then SIGKILL once the grace period expires
//! - Never makes [`ProcessSupervisor::execute`] fail: spawn errors, unknown
//!   agents, and non-zero exits are all reported in the result

use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use nix::sys::signal::Signal;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::invocation::{ArtifactPaths, RECURSION_GUARD_ENV, Scratch, build_args};
use crate::agents::{AgentCatalog, AgentDefinition, AgentSource};
use crate::config::RunnerConfig;
use crate::error::SupervisorError;
use crate::orchestration::types::{
    INTERRUPTED, ProgressRecord, TaskResult, TaskSpec, TaskStatus,
};
use crate::protocol::{AgentEvent, EventLineParser, Role, StopReason, final_assistant_text};

const STDOUT_CHUNK: usize = 8192;
const STDERR_CHUNK: usize = 4096;

/// Recorded for tool starts that carry no tool name.
const UNNAMED_TOOL: &str = "unknown";

/// One task handed to [`ProcessSupervisor::execute`].
pub struct TaskRun<'a> {
    /// Position of the task in its batch; stamped on every progress record.
    pub index: usize,
    pub spec: &'a TaskSpec,
    pub artifacts: ArtifactPaths,
    pub cancel: &'a CancellationToken,
    pub progress: Option<&'a UnboundedSender<ProgressRecord>>,
}

/// Launches agent processes according to a [`RunnerConfig`].
#[derive(Clone, Copy)]
pub struct ProcessSupervisor<'a> {
    config: &'a RunnerConfig,
    catalog: &'a dyn AgentCatalog,
}

impl<'a> ProcessSupervisor<'a> {
    pub fn new(config: &'a RunnerConfig, catalog: &'a dyn AgentCatalog) -> Self {
        Self { config, catalog }
    }

    /// Run one task and return its result. Always returns a result.
    pub async fn execute(&self, run: TaskRun<'_>) -> TaskResult {
        let started = Instant::now();

        let Some(agent) = self.catalog.resolve(&run.spec.agent_name) else {
            let mut tracker = Tracker::new(&run, AgentSource::Unknown, 0, started);
            let available = self.catalog.names();
            tracker.result.exit_code = 1;
            tracker.result.error_message = Some(format!("Unknown agent: {}", run.spec.agent_name));
            tracker.result.stderr_text = format!(
                "Unknown agent: {}. Available agents: {}",
                run.spec.agent_name,
                if available.is_empty() { "none".to_string() } else { available.join(", ") }
            );
            tracing::warn!(agent = %run.spec.agent_name, task_index = run.index, "Unknown agent");
            return self.finish(tracker, &run);
        };

        let mut tracker = Tracker::new(&run, agent.source, self.config.recent_tool_limit, started);

        if run.cancel.is_cancelled() {
            tracing::info!(agent = %agent.name, task_index = run.index, "Cancelled before spawn");
            tracker.result.exit_code = 1;
            tracker.mark_interrupted();
            return self.finish(tracker, &run);
        }

        if let Err(e) = self.drive(&agent, &run, &mut tracker).await {
            tracing::warn!(agent = %agent.name, task_index = run.index, error = %e, "Agent invocation failed");
            tracker.result.exit_code = 1;
            let message = e.to_string();
            if !tracker.result.stderr_text.is_empty() {
                tracker.result.stderr_text.push('\n');
            }
            tracker.result.stderr_text.push_str(&message);
            tracker.result.error_message = Some(message);
        }

        self.finish(tracker, &run)
    }

    /// Spawn the agent and pump its output until it has exited and both
    /// pipes are closed.
    async fn drive(
        &self,
        agent: &AgentDefinition,
        run: &TaskRun<'_>,
        tracker: &mut Tracker<'_>,
    ) -> Result<(), SupervisorError> {
        // Removed on drop, on every return path below.
        let scratch = Scratch::create(
            self.config.temp_dir.as_deref(),
            &run.spec.task_text,
            &agent.system_prompt,
        )
        .map_err(SupervisorError::Prepare)?;

        if let Some(path) = &run.artifacts.input {
            write_artifact(path, &run.spec.task_text);
        }

        let model = run.spec.model_override.as_deref().or(agent.model.as_deref());
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .args(build_args(agent, model, run.artifacts.session.as_deref(), &scratch))
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = run
            .spec
            .working_dir
            .as_ref()
            .or(self.config.default_working_dir.as_ref())
        {
            cmd.current_dir(dir);
        }

        if agent.recursive {
            cmd.env_remove(RECURSION_GUARD_ENV);
        } else {
            cmd.env(RECURSION_GUARD_ENV, "1");
        }

        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
            program: self.config.command.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout = child.stdout.take().ok_or(SupervisorError::MissingPipe("stdout"))?;
        let mut stderr = child.stderr.take().ok_or(SupervisorError::MissingPipe("stderr"))?;

        tracing::info!(
            agent = %agent.name,
            task_index = run.index,
            pid = ?pid,
            model = ?model,
            scratch = %scratch.path().display(),
            "Spawned agent process"
        );
        tracker.status = TaskStatus::Running;
        tracker.emit();

        let mut parser = EventLineParser::new();
        let mut out_buf = vec![0u8; STDOUT_CHUNK];
        let mut err_buf = vec![0u8; STDERR_CHUNK];
        let mut stderr_bytes = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit: Option<std::io::Result<ExitStatus>> = None;
        let mut cancel_seen = false;
        let mut interrupted = false;
        let mut kill_armed = false;

        let grace = self.config.grace_period;
        let kill_timer = tokio::time::sleep(grace);
        tokio::pin!(kill_timer);

        while exit.is_none() || stdout_open || stderr_open {
            tokio::select! {
                read = stdout.read(&mut out_buf), if stdout_open => match read {
                    Ok(0) | Err(_) => {
                        stdout_open = false;
                        if let Some(event) = parser.flush() {
                            tracker.apply(event);
                        }
                    }
                    Ok(n) => {
                        for event in parser.feed(&out_buf[..n]) {
                            tracker.apply(event);
                        }
                    }
                },
                read = stderr.read(&mut err_buf), if stderr_open => match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => stderr_bytes.extend_from_slice(&err_buf[..n]),
                },
                status = child.wait(), if exit.is_none() => {
                    tracing::debug!(agent = %agent.name, task_index = run.index, status = ?status, "Agent process exited");
                    exit = Some(status);
                }
                () = run.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    interrupted = exit.is_none();
                    tracing::info!(agent = %agent.name, task_index = run.index, "Cancelling agent process, sending SIGTERM");
                    signal_group(pid, Signal::SIGTERM);
                    kill_timer.as_mut().reset(tokio::time::Instant::now() + grace);
                    kill_armed = true;
                }
                () = &mut kill_timer, if kill_armed => {
                    tracing::warn!(agent = %agent.name, task_index = run.index, "Grace period expired, sending SIGKILL");
                    signal_group(pid, Signal::SIGKILL);
                    kill_armed = false;
                }
            }
        }

        tracker.result.stderr_text = String::from_utf8_lossy(&stderr_bytes).into_owned();
        tracker.result.exit_code = match exit {
            Some(Ok(status)) => exit_code_of(status),
            Some(Err(e)) => {
                tracker.result.stderr_text.push_str(&format!("\nwait failed: {e}"));
                1
            }
            None => 1,
        };
        if interrupted {
            // An agent that handles SIGTERM and exits cleanly was still cancelled.
            if tracker.result.exit_code == 0 {
                tracker.result.exit_code = 128 + Signal::SIGTERM as i32;
            }
            tracker.mark_interrupted();
        }

        tracing::info!(
            agent = %agent.name,
            task_index = run.index,
            exit_code = tracker.result.exit_code,
            turns = tracker.result.usage.turns,
            interrupted,
            "Agent process finished"
        );
        Ok(())
    }

    /// Stamp duration, publish the terminal progress record, and persist output.
    fn finish(&self, mut tracker: Tracker, run: &TaskRun<'_>) -> TaskResult {
        if tracker.result.duration_ms == 0 {
            tracker.result.duration_ms = tracker.elapsed_ms();
        }
        tracker.status = if tracker.result.is_error() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        tracker.current_tool = None;
        tracker.emit();

        if let Some(path) = &run.artifacts.output {
            write_artifact(path, tracker.result.best_output());
        }

        tracker.result
    }
}

/// Progress state for one running task, wrapped around its [`TaskResult`].
struct Tracker<'a> {
    index: usize,
    result: TaskResult,
    status: TaskStatus,
    current_tool: Option<String>,
    tool_started: Option<Instant>,
    tool_call_count: u64,
    recent_tools: VecDeque<String>,
    recent_tool_limit: usize,
    started: Instant,
    progress: Option<&'a UnboundedSender<ProgressRecord>>,
}

impl<'a> Tracker<'a> {
    fn new(run: &TaskRun<'a>, source: AgentSource, recent_tool_limit: usize, started: Instant) -> Self {
        Self {
            index: run.index,
            result: TaskResult::pending(run.spec, source),
            status: TaskStatus::Queued,
            current_tool: None,
            tool_started: None,
            tool_call_count: 0,
            recent_tools: VecDeque::with_capacity(recent_tool_limit),
            recent_tool_limit,
            started,
            progress: run.progress,
        }
    }

    fn apply(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::ToolExecutionStart { tool_name, .. } => {
                self.tool_call_count += 1;
                self.current_tool = Some(tool_name.unwrap_or_else(|| UNNAMED_TOOL.to_string()));
                self.tool_started = Some(Instant::now());
            }
            AgentEvent::ToolExecutionEnd { tool_name, .. } => {
                let finished = self.current_tool.take().or(tool_name);
                if let (Some(name), Some(started)) = (&finished, self.tool_started.take()) {
                    tracing::debug!(task_index = self.index, tool = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool finished");
                }
                if let Some(name) = finished {
                    self.remember_tool(name);
                }
            }
            AgentEvent::MessageEnd { message: Some(message) } => {
                if message.role == Role::Assistant {
                    self.result.usage.record_assistant_turn(message.usage.as_ref());
                    if message.model.is_some() {
                        self.result.resolved_model.clone_from(&message.model);
                    }
                    if message.stop_reason.is_some() {
                        self.result.stop_reason = message.stop_reason;
                    }
                    if message.error_message.is_some() {
                        self.result.error_message.clone_from(&message.error_message);
                    }
                }
                self.result.messages.push(message);
            }
            AgentEvent::ToolResultEnd { message: Some(message) } => {
                self.result.messages.push(message);
            }
            AgentEvent::AgentEnd => {
                self.result.duration_ms = self.elapsed_ms();
            }
            AgentEvent::MessageEnd { message: None }
            | AgentEvent::ToolResultEnd { message: None }
            | AgentEvent::Unknown => return,
        }
        self.emit();
    }

    fn remember_tool(&mut self, name: String) {
        if self.recent_tool_limit == 0 {
            return;
        }
        while self.recent_tools.len() >= self.recent_tool_limit {
            self.recent_tools.pop_front();
        }
        self.recent_tools.push_back(name);
    }

    fn mark_interrupted(&mut self) {
        self.result.interrupted = true;
        self.result.stderr_text = INTERRUPTED.to_string();
        self.result.stop_reason = Some(StopReason::Aborted);
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn record(&self) -> ProgressRecord {
        ProgressRecord {
            task_index: self.index,
            agent_name: self.result.agent_name.clone(),
            status: self.status,
            current_tool_name: self.current_tool.clone(),
            tool_call_count: self.tool_call_count,
            recent_tools: self.recent_tools.iter().cloned().collect(),
            tokens_so_far: self.result.usage.tokens(),
            usage: self.result.usage.clone(),
            last_output: final_assistant_text(&self.result.messages).map(str::to_string),
            elapsed_ms: self.elapsed_ms(),
        }
    }

    fn emit(&self) {
        if let Some(tx) = self.progress {
            let _ = tx.send(self.record());
        }
    }
}

/// Signal the agent's whole process group. Errors (typically ESRCH once the
/// group is gone) are logged and ignored.
fn signal_group(pid: Option<u32>, signal: Signal) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), signal) {
        tracing::debug!(pid, signal = ?signal, error = %e, "Failed to signal process group");
    }
}

/// Exit code, or `128 + signal` for a process killed by a signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(1, |signal| 128 + signal))
}

/// Best-effort write of an artifact file; failures are logged and swallowed.
fn write_artifact(path: &std::path::Path, contents: &str) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!("Failed to create artifact directory {}: {}", parent.display(), e);
        return;
    }
    if let Err(e) = std::fs::write(path, contents) {
        tracing::warn!("Failed to write artifact {}: {}", path.display(), e);
    }
}
