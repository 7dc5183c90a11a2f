use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "delegate",
    version,
    about = "Delegate tasks to external agent subprocesses"
)]
pub struct Cli {
    /// Path to config file (replaces the project config file)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single task, parallel tasks, or a chain
    Run {
        /// Agent for a single task
        #[arg(short, long)]
        agent: Option<String>,

        /// Task text for a single task
        #[arg(short, long)]
        task: Option<String>,

        /// Independent task, as AGENT=TASK (repeatable)
        #[arg(long = "parallel", value_name = "AGENT=TASK", value_parser = parse_task_arg)]
        parallel: Vec<TaskArg>,

        /// Chain step, as AGENT=TASK (repeatable); `{previous}` is replaced
        /// with the prior step's output
        #[arg(long = "chain", value_name = "AGENT=TASK", value_parser = parse_task_arg)]
        chain: Vec<TaskArg>,

        /// Working directory for the agent processes
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Model override applied to every task
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum number of parallel tasks running at once
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Directory for per-task input/session/output files
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Print the full batch result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the agents available to `run`
    Agents,
}

/// One `AGENT=TASK` command-line pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskArg {
    pub agent: String,
    pub task: String,
}

fn parse_task_arg(raw: &str) -> Result<TaskArg, String> {
    let (agent, task) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected AGENT=TASK, got `{raw}`"))?;
    let agent = agent.trim();
    if agent.is_empty() {
        return Err(format!("missing agent name in `{raw}`"));
    }
    Ok(TaskArg {
        agent: agent.to_string(),
        task: task.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_arg_splits_on_first_equals() {
        let arg = parse_task_arg("scout=find a=b usages").unwrap();
        assert_eq!(arg.agent, "scout");
        assert_eq!(arg.task, "find a=b usages");
    }

    #[test]
    fn task_arg_requires_agent() {
        assert!(parse_task_arg("no separator").is_err());
        assert!(parse_task_arg(" =task").is_err());
    }

    #[test]
    fn run_accepts_repeated_chain_steps() {
        let cli = Cli::try_parse_from([
            "delegate",
            "run",
            "--chain",
            "scout=look",
            "--chain",
            "planner=plan {previous}",
        ])
        .unwrap();
        let Commands::Run { chain, parallel, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(parallel.is_empty());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].task, "plan {previous}");
    }
}
