//! Agent event-stream protocol.
//!
//! [`events`] defines the typed events an agent writes to stdout in JSON mode;
//! [`parser::EventLineParser`] turns the raw byte stream into those events.

pub mod events;
pub mod parser;

pub use events::{
    AgentEvent, AgentMessage, ContentBlock, MessageUsage, Role, StopReason, final_assistant_text,
};
pub use parser::EventLineParser;
