use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid agent definition: {0}")]
    InvalidAgent(String),
}

/// Errors that reject a batch before any process is spawned.
///
/// These are the only failures [`crate::orchestration::Orchestrator::run`]
/// reports as `Err`; everything that happens after spawning is captured in
/// per-task results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No mode selected: provide a single task, parallel tasks, or a chain")]
    NoModeSelected,

    #[error("Exactly one mode must be selected, got: {}", .0.join(", "))]
    MultipleModes(Vec<&'static str>),

    #[error("Too many parallel tasks ({requested}); the maximum is {max}")]
    TooManyParallelTasks { requested: usize, max: usize },

    #[error("Nested delegation is disabled for this agent (DELEGATE_NO_RECURSE is set)")]
    RecursionBlocked,
}

/// Errors raised while preparing or launching a single agent process.
///
/// Never escapes the supervisor: every variant is folded into the task's
/// result as a non-zero exit code and an error message.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to prepare scratch files: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("Failed to spawn agent process `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent process has no {0} pipe")]
    MissingPipe(&'static str),
}
