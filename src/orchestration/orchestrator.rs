//! Batch execution: single task, independent parallel tasks, or a chain.
//!
//! [`Orchestrator::run`] validates a [`RunRequest`] before anything is
//! spawned, then drives one [`ProcessSupervisor`] per task. Supervisors report
//! per-task [`ProgressRecord`]s over an mpsc channel; a [`ProgressBoard`]
//! drains it concurrently with the batch and republishes whole-batch
//! [`BatchSnapshot`]s to the caller.
//!
//! **Cancellation model:** one [`CancellationToken`] per batch reaches every
//! running supervisor. A chain checks it before each step, so cancelled steps
//! are never spawned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use super::aggregate::aggregate_usage;
use super::limiter::run_all;
use super::progress::ProgressBoard;
use super::types::{
    BatchDetails, BatchMode, BatchResult, BatchSnapshot, FailedStep, INTERRUPTED, NO_OUTPUT,
    ProgressRecord, TaskOutcome, TaskResult, TaskSpec,
};
use crate::agents::AgentCatalog;
use crate::config::RunnerConfig;
use crate::error::ValidationError;
use crate::exec::{ArtifactPaths, ProcessSupervisor, TaskRun};

/// Replaced in every chain step's task text with the previous step's output.
pub const PREVIOUS_PLACEHOLDER: &str = "{previous}";

/// What the caller asked for. Exactly one mode must be populated; empty
/// lists count as absent.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub single: Option<TaskSpec>,
    pub parallel: Vec<TaskSpec>,
    pub chain: Vec<TaskSpec>,
    /// Overrides the configured artifact directory for this run.
    pub artifact_dir: Option<PathBuf>,
}

/// A validated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Batch {
    Single(TaskSpec),
    Parallel(Vec<TaskSpec>),
    Chain(Vec<TaskSpec>),
}

impl RunRequest {
    pub fn into_batch(self) -> Result<Batch, ValidationError> {
        let mut selected = Vec::new();
        if let Some(spec) = self.single {
            selected.push(Batch::Single(spec));
        }
        if !self.parallel.is_empty() {
            selected.push(Batch::Parallel(self.parallel));
        }
        if !self.chain.is_empty() {
            selected.push(Batch::Chain(self.chain));
        }

        let batch = selected.pop().ok_or(ValidationError::NoModeSelected)?;
        if !selected.is_empty() {
            let mut modes: Vec<&'static str> = selected.iter().map(Batch::mode_name).collect();
            modes.push(batch.mode_name());
            return Err(ValidationError::MultipleModes(modes));
        }
        Ok(batch)
    }
}

impl Batch {
    pub fn mode(&self) -> BatchMode {
        match self {
            Batch::Single(_) => BatchMode::Single,
            Batch::Parallel(_) => BatchMode::Parallel,
            Batch::Chain(_) => BatchMode::Chain,
        }
    }

    fn mode_name(&self) -> &'static str {
        match self {
            Batch::Single(_) => "single",
            Batch::Parallel(_) => "parallel",
            Batch::Chain(_) => "chain",
        }
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        match self {
            Batch::Single(spec) => std::slice::from_ref(spec),
            Batch::Parallel(specs) | Batch::Chain(specs) => specs,
        }
    }
}

/// Per-run values shared by every task of a batch.
struct RunContext<'a> {
    run_id: &'a str,
    artifact_dir: Option<&'a Path>,
    cancel: &'a CancellationToken,
    progress: &'a UnboundedSender<ProgressRecord>,
}

/// How the tasks of a batch ended, before summarizing.
struct Executed {
    results: Vec<TaskResult>,
    success: bool,
    text: String,
    failed_step: Option<FailedStep>,
}

/// Runs batches of agent tasks against a fixed configuration and catalog.
pub struct Orchestrator {
    config: RunnerConfig,
    catalog: Arc<dyn AgentCatalog>,
}

impl Orchestrator {
    pub fn new(config: RunnerConfig, catalog: Arc<dyn AgentCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Validate and run a batch.
    ///
    /// Only validation problems are returned as `Err`, and nothing is spawned
    /// when one occurs. Every per-task failure, including cancellation, is
    /// reported inside the [`BatchResult`].
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        progress: Option<UnboundedSender<BatchSnapshot>>,
    ) -> Result<BatchResult, ValidationError> {
        if self.config.recursion_blocked {
            return Err(ValidationError::RecursionBlocked);
        }

        let artifact_dir = request
            .artifact_dir
            .clone()
            .or_else(|| self.config.artifact_dir.clone());
        let batch = request.into_batch()?;

        if let Batch::Parallel(tasks) = &batch
            && tasks.len() > self.config.max_parallel_tasks
        {
            return Err(ValidationError::TooManyParallelTasks {
                requested: tasks.len(),
                max: self.config.max_parallel_tasks,
            });
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let mode = batch.mode();
        let started_at = Utc::now().to_rfc3339();
        let started = Instant::now();
        tracing::info!(
            run_id = %run_id,
            mode = ?mode,
            tasks = batch.tasks().len(),
            "Starting batch"
        );

        let mut board = ProgressBoard::new(mode, batch.tasks());
        if let Some(out) = &progress {
            let _ = out.send(board.snapshot());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressRecord>();

        let work = async {
            // Moved in so the channel closes once the batch is done.
            let tx = tx;
            let ctx = RunContext {
                run_id: &run_id,
                artifact_dir: artifact_dir.as_deref(),
                cancel: &cancel,
                progress: &tx,
            };
            match &batch {
                Batch::Single(spec) => self.run_single(&ctx, spec).await,
                Batch::Parallel(specs) => self.run_parallel(&ctx, specs).await,
                Batch::Chain(specs) => self.run_chain(&ctx, specs).await,
            }
        };

        let drain = async {
            while let Some(record) = rx.recv().await {
                if board.apply(record)
                    && let Some(out) = &progress
                {
                    let _ = out.send(board.snapshot());
                }
            }
            board
        };

        let (executed, board) = tokio::join!(work, drain);

        let output_file_paths = match &artifact_dir {
            Some(dir) => executed
                .results
                .iter()
                .enumerate()
                .filter_map(|(index, result)| {
                    ArtifactPaths::in_dir(dir, &run_id, &result.agent_name, index).output
                })
                .collect(),
            None => Vec::new(),
        };

        let success_count = executed.results.iter().filter(|r| r.exit_code == 0).count();
        let usage = aggregate_usage(&executed.results);
        let total_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            run_id = %run_id,
            mode = ?mode,
            success = executed.success,
            success_count,
            tasks = executed.results.len(),
            cost_usd = usage.cost_usd,
            duration_ms = total_duration_ms,
            "Batch finished"
        );

        Ok(BatchResult {
            details: BatchDetails {
                run_id,
                mode,
                started_at,
                results: executed.results,
                progress_snapshots: board.into_records(),
                output_file_paths,
                total_duration_ms,
            },
            success: executed.success,
            success_count,
            text: executed.text,
            failed_step: executed.failed_step,
            usage,
        })
    }

    async fn execute(&self, ctx: &RunContext<'_>, index: usize, spec: &TaskSpec) -> TaskResult {
        let artifacts = ctx
            .artifact_dir
            .map(|dir| ArtifactPaths::in_dir(dir, ctx.run_id, &spec.agent_name, index))
            .unwrap_or_default();

        ProcessSupervisor::new(&self.config, self.catalog.as_ref())
            .execute(TaskRun {
                index,
                spec,
                artifacts,
                cancel: ctx.cancel,
                progress: Some(ctx.progress),
            })
            .await
    }

    async fn run_single(&self, ctx: &RunContext<'_>, spec: &TaskSpec) -> Executed {
        let result = self.execute(ctx, 0, spec).await;
        let success = !result.is_error();
        let text = if success {
            result.final_output().unwrap_or(NO_OUTPUT).to_string()
        } else {
            result.failure_message()
        };
        Executed {
            results: vec![result],
            success,
            text,
            failed_step: None,
        }
    }

    async fn run_parallel(&self, ctx: &RunContext<'_>, specs: &[TaskSpec]) -> Executed {
        let results = run_all(specs, self.config.max_concurrency, |spec, index| {
            self.execute(ctx, index, spec)
        })
        .await;

        let succeeded = results.iter().filter(|r| r.exit_code == 0).count();
        let mut text = format!("{succeeded}/{} tasks succeeded", results.len());
        for result in &results {
            let body = match result.outcome() {
                TaskOutcome::Completed => result.final_output().unwrap_or(NO_OUTPUT).to_string(),
                TaskOutcome::Failed => result.failure_message(),
                TaskOutcome::Interrupted => INTERRUPTED.to_string(),
            };
            text.push_str(&format!(
                "\n\n[{}] {}: {}",
                result.agent_name,
                outcome_label(result.outcome()),
                body
            ));
        }

        // Siblings are independent; a failed task never fails the batch.
        Executed {
            results,
            success: true,
            text,
            failed_step: None,
        }
    }

    async fn run_chain(&self, ctx: &RunContext<'_>, steps: &[TaskSpec]) -> Executed {
        let mut results: Vec<TaskResult> = Vec::with_capacity(steps.len());
        let mut previous = String::new();

        for (index, step) in steps.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                tracing::info!(run_id = ctx.run_id, step = index, "Chain cancelled before step");
                return Executed {
                    results,
                    success: false,
                    text: format!("{INTERRUPTED} before step {} ({})", index + 1, step.agent_name),
                    failed_step: None,
                };
            }

            let spec = TaskSpec {
                task_text: step.task_text.replace(PREVIOUS_PLACEHOLDER, &previous),
                step_index: Some(index),
                ..step.clone()
            };
            let result = self.execute(ctx, index, &spec).await;

            if result.is_interrupted() {
                tracing::info!(run_id = ctx.run_id, step = index, "Chain cancelled during step");
                let text = format!("{INTERRUPTED} during step {} ({})", index + 1, result.agent_name);
                results.push(result);
                return Executed {
                    results,
                    success: false,
                    text,
                    failed_step: None,
                };
            }

            if result.is_error() {
                tracing::info!(
                    run_id = ctx.run_id,
                    step = index,
                    agent = %result.agent_name,
                    exit_code = result.exit_code,
                    "Chain halted on failed step"
                );
                let text = format!(
                    "Chain stopped at step {} ({}): {}",
                    index + 1,
                    result.agent_name,
                    result.failure_message()
                );
                let failed_step = FailedStep {
                    index,
                    agent_name: result.agent_name.clone(),
                };
                results.push(result);
                return Executed {
                    results,
                    success: false,
                    text,
                    failed_step: Some(failed_step),
                };
            }

            previous = result.final_output().unwrap_or_default().to_string();
            results.push(result);
        }

        let text = results
            .last()
            .and_then(TaskResult::final_output)
            .unwrap_or(NO_OUTPUT)
            .to_string();
        Executed {
            results,
            success: true,
            text,
            failed_step: None,
        }
    }
}

fn outcome_label(outcome: TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Completed => "completed",
        TaskOutcome::Failed => "failed",
        TaskOutcome::Interrupted => "interrupted",
    }
}
