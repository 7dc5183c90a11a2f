//! Argument vector and scratch files for one agent invocation.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::agents::AgentDefinition;

/// Exported to agents that may not delegate further.
pub const RECURSION_GUARD_ENV: &str = "DELEGATE_NO_RECURSE";

const TASK_FILE: &str = "task.md";
const SYSTEM_PROMPT_FILE: &str = "system-prompt.md";

/// Optional files a caller wants kept for one task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Receives the effective task prompt.
    pub input: Option<PathBuf>,
    /// Passed to the agent as its session file.
    pub session: Option<PathBuf>,
    /// Receives the task's final output once it has finished.
    pub output: Option<PathBuf>,
}

impl ArtifactPaths {
    /// Standard artifact names for one task under `dir`.
    pub fn in_dir(dir: &Path, run_id: &str, agent_name: &str, index: usize) -> Self {
        let stem = format!("{run_id}_{}_{index}", sanitize(agent_name));
        Self {
            input: Some(dir.join(format!("{stem}_input.md"))),
            session: Some(dir.join(format!("{stem}_session.jsonl"))),
            output: Some(dir.join(format!("{stem}_output.md"))),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Private per-invocation directory holding the prompt files.
///
/// The directory is created with owner-only permissions and removed when the
/// value is dropped, whichever way the invocation ends.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
    task_file: PathBuf,
    system_prompt_file: Option<PathBuf>,
}

impl Scratch {
    pub fn create(root: Option<&Path>, task_text: &str, system_prompt: &str) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("delegate-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let task_file = dir.path().join(TASK_FILE);
        write_private(&task_file, task_text)?;

        let system_prompt_file = if system_prompt.trim().is_empty() {
            None
        } else {
            let path = dir.path().join(SYSTEM_PROMPT_FILE);
            write_private(&path, system_prompt)?;
            Some(path)
        };

        Ok(Self {
            dir,
            task_file,
            system_prompt_file,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn task_file(&self) -> &Path {
        &self.task_file
    }

    pub fn system_prompt_file(&self) -> Option<&Path> {
        self.system_prompt_file.as_deref()
    }
}

fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()
}

/// Arguments appended after the configured command and its fixed arguments.
///
/// Always requests JSON streaming in print mode. The task body is referenced
/// as `@<file>` rather than inlined.
pub fn build_args(
    agent: &AgentDefinition,
    model: Option<&str>,
    session: Option<&Path>,
    scratch: &Scratch,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--mode".into(), "json".into(), "-p".into()];

    match session {
        Some(path) => {
            args.push("--session".into());
            args.push(path.into());
        }
        None => args.push("--no-session".into()),
    }

    if let Some(model) = model {
        args.push("--model".into());
        args.push(model.into());
    }

    if let Some(tools) = agent.tools.as_ref().filter(|t| !t.is_empty()) {
        args.push("--tools".into());
        args.push(tools.join(",").into());
    }

    if let Some(prompt_file) = scratch.system_prompt_file() {
        args.push("--append-system-prompt".into());
        args.push(prompt_file.into());
    }

    let mut task_ref = OsString::from("@");
    task_ref.push(scratch.task_file());
    args.push(task_ref);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn minimal_invocation() {
        let scratch = Scratch::create(None, "do it", "").unwrap();
        let args = strings(&build_args(&AgentDefinition::new("a"), None, None, &scratch));

        assert_eq!(&args[..4], ["--mode", "json", "-p", "--no-session"]);
        assert_eq!(args.len(), 5);
        assert_eq!(args[4], format!("@{}", scratch.task_file().display()));
        assert!(scratch.system_prompt_file().is_none());
    }

    #[test]
    fn full_invocation() {
        let mut agent = AgentDefinition::new("scout");
        agent.tools = Some(vec!["read".into(), "grep".into()]);
        let scratch = Scratch::create(None, "look", "Be brief.").unwrap();
        let session = Path::new("/tmp/session.jsonl");

        let args = strings(&build_args(&agent, Some("haiku"), Some(session), &scratch));
        let prompt = scratch.system_prompt_file().unwrap().display().to_string();

        assert_eq!(
            args,
            vec![
                "--mode".to_string(),
                "json".into(),
                "-p".into(),
                "--session".into(),
                "/tmp/session.jsonl".into(),
                "--model".into(),
                "haiku".into(),
                "--tools".into(),
                "read,grep".into(),
                "--append-system-prompt".into(),
                prompt,
                format!("@{}", scratch.task_file().display()),
            ]
        );
    }

    #[test]
    fn scratch_files_are_private_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = Scratch::create(Some(root.path()), "task body", "system").unwrap();
        let dir = scratch.path().to_path_buf();

        assert_eq!(std::fs::read_to_string(scratch.task_file()).unwrap(), "task body");
        let mode = std::fs::metadata(scratch.task_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn artifact_names_are_filesystem_safe() {
        let paths = ArtifactPaths::in_dir(Path::new("/runs"), "r1", "code/review", 2);
        assert_eq!(paths.output.unwrap(), Path::new("/runs/r1_code_review_2_output.md"));
        assert_eq!(paths.input.unwrap(), Path::new("/runs/r1_code_review_2_input.md"));
    }
}
