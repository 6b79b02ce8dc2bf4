use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the sandbox refused a call, before or during execution.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SandboxViolation {
    #[error("path: {detail}")]
    Path { detail: String },

    #[error("command: {detail}")]
    Command { detail: String },

    #[error("timeout: execution exceeded {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("size: output of {actual} bytes exceeds the {limit} byte limit")]
    OutputSize { limit: usize, actual: usize },
}

impl SandboxViolation {
    pub fn path(detail: impl Into<String>) -> Self {
        SandboxViolation::Path {
            detail: detail.into(),
        }
    }

    pub fn command(detail: impl Into<String>) -> Self {
        SandboxViolation::Command {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SandboxViolation::Path { .. } => "path",
            SandboxViolation::Command { .. } => "command",
            SandboxViolation::Timeout { .. } => "timeout",
            SandboxViolation::OutputSize { .. } => "size",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool disabled: {0}")]
    ToolDisabled(String),

    #[error("Sandbox violation: {0}")]
    SandboxViolation(#[from] SandboxViolation),

    #[error("Approval denied: {reason}")]
    ApprovalDenied { reason: String },

    #[error("Approval request expired")]
    ApprovalExpired,

    #[error("Approval transport failed to notify: {0}")]
    TransportNotifyFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tool not found: {0}")]
    NotFound(String),
}
