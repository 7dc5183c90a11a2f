//! Batch orchestration.
//!
//! [`Orchestrator`] turns a [`RunRequest`] into supervised agent processes,
//! using the bounded [`limiter`] for parallel batches and the
//! [`progress`] board for whole-batch snapshots. Shared vocabulary lives in
//! [`types`].

pub mod aggregate;
pub mod limiter;
pub mod orchestrator;
pub mod progress;
pub mod types;

pub use aggregate::aggregate_usage;
pub use orchestrator::{Batch, Orchestrator, PREVIOUS_PLACEHOLDER, RunRequest};
pub use types::*;
