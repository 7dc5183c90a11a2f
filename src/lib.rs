pub mod agents;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod orchestration;
pub mod protocol;
