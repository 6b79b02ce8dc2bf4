pub mod base;

pub use base::{Tool, ToolResult};
