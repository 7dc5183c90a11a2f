//! Fake agent executable shared by the integration tests.
//!
//! The fake agent is a POSIX `sh` script that understands the same invocation
//! the supervisor builds. It records every spawn, copies its task prompt,
//! environment guard, and working directory into the state directory, and
//! replies with `done: <task>`. Its behavior is selected with `--model`:
//! - `fail`: reports an error stop reason and exits 3
//! - `sleepy`: ignores SIGTERM and sleeps, so only SIGKILL ends it
//! - `graceful`: sleeps until SIGTERM, then exits 0
//! - anything else: one tool call and one assistant message, exit 0
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use delegate::agents::{AgentCatalog, AgentDefinition, AgentRegistry};
use delegate::config::RunnerConfig;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SCRIPT: &str = r#"
state='__STATE__'
model=""
task_file=""
while [ $# -gt 0 ]; do
  case "$1" in
    --model) model="$2"; shift 2 ;;
    --session|--tools|--append-system-prompt) shift 2 ;;
    @*) task_file="${1#@}"; shift ;;
    *) shift ;;
  esac
done

n=$(($(wc -l < "$state/spawns.log")))
echo "spawn" >> "$state/spawns.log"
cp "$task_file" "$state/input-$n.md"
printf '%s' "${DELEGATE_NO_RECURSE:-unset}" > "$state/guard-$n"
pwd > "$state/cwd-$n"
task=$(cat "$task_file")

case "$model" in
  sleepy)
    trap '' TERM
    exec sleep 30
    ;;
  graceful)
    trap 'exit 0' TERM
    sleep 30 &
    wait
    exit 0
    ;;
  fail)
    echo "fake agent failed" >&2
    printf '{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"partial"}],"stopReason":"error","errorMessage":"model exploded"}}\n'
    exit 3
    ;;
esac

printf '%s\n' '{"type":"agent_start"}'
printf '%s\n' '{"type":"tool_execution_start","toolName":"read","args":{"path":"README.md"}}'
printf '%s\n' '{"type":"tool_execution_end","toolName":"read","isError":false}'
printf '{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"done: %s"}],"usage":{"input":10,"output":5,"cacheRead":1,"cacheWrite":2,"cost":{"total":0.5},"totalTokens":15},"model":"%s","stopReason":"stop"}}\n' "$task" "${model:-default}"
printf '%s\n' '{"type":"agent_end"}'
"#;

pub struct FakeAgent {
    pub dir: TempDir,
    pub script: PathBuf,
}

impl FakeAgent {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let script = dir.path().join("agent.sh");
        let body = SCRIPT.replace("__STATE__", &dir.path().display().to_string());
        std::fs::write(&script, body).expect("failed to write fake agent");
        std::fs::write(dir.path().join("spawns.log"), "").expect("failed to create spawn log");
        Self { dir, script }
    }

    pub fn config(&self) -> RunnerConfig {
        RunnerConfig {
            command: "sh".to_string(),
            args: vec![self.script.display().to_string()],
            grace_period: Duration::from_millis(200),
            temp_dir: Some(self.dir.path().join("scratch")),
            ..Default::default()
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn spawn_count(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("spawns.log"))
            .unwrap()
            .lines()
            .count()
    }

    /// Cancel `cancel` once `spawns` agent processes have started.
    pub fn cancel_after_spawns(&self, spawns: usize, cancel: CancellationToken) {
        let log = self.dir.path().join("spawns.log");
        tokio::spawn(async move {
            loop {
                let started = std::fs::read_to_string(&log).map_or(0, |s| s.lines().count());
                if started >= spawns {
                    // Let the agents get past their setup before signalling them.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    cancel.cancel();
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
    }

    /// Task prompt received by the `n`th spawn.
    pub fn input(&self, n: usize) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("input-{n}.md"))).unwrap()
    }

    pub fn guard(&self, n: usize) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("guard-{n}"))).unwrap()
    }

    pub fn cwd(&self, n: usize) -> PathBuf {
        let raw = std::fs::read_to_string(self.dir.path().join(format!("cwd-{n}"))).unwrap();
        PathBuf::from(raw.trim_end())
    }
}

pub fn catalog(agents: impl IntoIterator<Item = AgentDefinition>) -> Arc<dyn AgentCatalog> {
    Arc::new(agents.into_iter().collect::<AgentRegistry>())
}

pub fn agents(names: &[&str]) -> Arc<dyn AgentCatalog> {
    catalog(names.iter().map(|name| AgentDefinition::new(*name)))
}
