//! The bounded multi-turn agent loop.

pub mod driver;

pub use driver::{AgentDriver, AgentOutcome, ToolCallRecord};
