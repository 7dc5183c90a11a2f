use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use delegate::agents::AgentRegistry;
use delegate::cli::{self, Commands, TaskArg};
use delegate::config::{self, AppConfig};
use delegate::orchestration::{BatchResult, BatchSnapshot, Orchestrator, RunRequest, TaskSpec};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the batch result.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let config = config::load_config(&cli)?;
    tracing::info!(
        command = %config.runner.command,
        agents = config.agents.len(),
        "Config loaded"
    );

    match cli.command {
        Commands::Run {
            agent,
            task,
            parallel,
            chain,
            model,
            json,
            ..
        } => {
            let request = build_request(agent, task, parallel, chain, model.as_deref())?;
            let result = run_batch(config, request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }

            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Agents => list_agents(&config.agents),
    }

    Ok(())
}

fn build_request(
    agent: Option<String>,
    task: Option<String>,
    parallel: Vec<TaskArg>,
    chain: Vec<TaskArg>,
    model: Option<&str>,
) -> anyhow::Result<RunRequest> {
    let to_spec = |agent: String, task: String| {
        let spec = TaskSpec::new(agent, task);
        match model {
            Some(model) => spec.with_model(model),
            None => spec,
        }
    };

    let single = match (agent, task) {
        (Some(agent), Some(task)) => Some(to_spec(agent, task)),
        (None, None) => None,
        (Some(_), None) => anyhow::bail!("--agent requires --task"),
        (None, Some(_)) => anyhow::bail!("--task requires --agent"),
    };

    Ok(RunRequest {
        single,
        parallel: parallel.into_iter().map(|t| to_spec(t.agent, t.task)).collect(),
        chain: chain.into_iter().map(|t| to_spec(t.agent, t.task)).collect(),
        // Already folded into the runner config by `load_config`.
        artifact_dir: None,
    })
}

async fn run_batch(config: AppConfig, request: RunRequest) -> anyhow::Result<BatchResult> {
    let orchestrator = Orchestrator::new(config.runner, Arc::new(config.agents));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let interrupts = futures::stream::unfold((), |()| async {
                tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
            });
            if escalate_interrupts(std::pin::pin!(interrupts), cancel).await {
                tracing::error!("Second interrupt received, exiting without waiting for agents");
                std::process::exit(130);
            }
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<BatchSnapshot>();
    let reporter = tokio::spawn(async move {
        while let Some(snapshot) = progress_rx.recv().await {
            log_snapshot(&snapshot);
        }
    });

    let result = orchestrator
        .run(request, cancel, Some(progress_tx))
        .await
        .context("Invalid run request")?;

    // The sender was dropped with the batch; let the reporter drain.
    let _ = reporter.await;
    Ok(result)
}

/// Cancel the batch on the first interrupt. Returns `true` if a second
/// interrupt arrives, meaning the user wants to quit without waiting.
async fn escalate_interrupts<S>(mut interrupts: S, cancel: CancellationToken) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    tracing::warn!("Interrupt received, cancelling running agents (press Ctrl-C again to force quit)");
    cancel.cancel();
    interrupts.next().await.is_some()
}

fn log_snapshot(snapshot: &BatchSnapshot) {
    for task in &snapshot.tasks {
        tracing::debug!(
            task_index = task.task_index,
            agent = %task.agent_name,
            status = ?task.status,
            tool = task.current_tool_name.as_deref().unwrap_or("-"),
            tool_calls = task.tool_call_count,
            tokens = task.tokens_so_far,
            elapsed_ms = task.elapsed_ms,
            "Task progress"
        );
    }
    let done = snapshot.tasks.iter().filter(|t| t.status.is_terminal()).count();
    tracing::info!(mode = ?snapshot.mode, done, total = snapshot.tasks.len(), "Batch progress");
}

fn print_summary(result: &BatchResult) {
    println!("{}", result.text);
    let usage = &result.usage;
    eprintln!(
        "\n{} {}/{} succeeded | {} turns | in {} out {} | cache r {} w {} | ${:.4} | {}ms",
        if result.success { "ok" } else { "FAILED" },
        result.success_count,
        result.details.results.len(),
        usage.turns,
        usage.input,
        usage.output,
        usage.cache_read,
        usage.cache_write,
        usage.cost_usd,
        result.details.total_duration_ms,
    );
    for path in &result.details.output_file_paths {
        eprintln!("  output: {}", path.display());
    }
}

fn list_agents(agents: &AgentRegistry) {
    if agents.is_empty() {
        println!("No agents configured.");
        return;
    }
    for agent in agents.definitions() {
        let model = agent.model.as_deref().unwrap_or("default model");
        let tools = agent
            .tools
            .as_ref()
            .map_or_else(|| "all tools".to_string(), |t| t.join(","));
        println!(
            "{:<20} {:<8} {:<24} {}{}",
            agent.name,
            format!("{:?}", agent.source).to_lowercase(),
            model,
            tools,
            if agent.recursive { " (recursive)" } else { "" }
        );
    }
}
