//! Launching and supervising agent processes.

pub mod invocation;
pub mod supervisor;

pub use invocation::{ArtifactPaths, RECURSION_GUARD_ENV};
pub use supervisor::{ProcessSupervisor, TaskRun};
