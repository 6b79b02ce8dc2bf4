use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::outcome::AuditRecord;
use crate::request::ToolCallRequest;
use crate::tools::ToolResult;
use async_trait::async_trait;
use serde_json::Value;

/// Runs a tool once every gate has passed.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        params: Value,
        ctx: ExecutionContext,
    ) -> Result<ToolResult, ToolError>;
}

/// How a human-approval round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalVerdict {
    Approved {
        approval_id: String,
        approver: String,
        /// The approver chose to trust the session for the rest of its TTL.
        elevate_trust: bool,
    },
    Denied {
        approval_id: Option<String>,
        reason: String,
    },
    Expired {
        approval_id: String,
    },
    NotifyFailed {
        approval_id: String,
        detail: String,
    },
}

impl ApprovalVerdict {
    pub fn approval_id(&self) -> Option<&str> {
        match self {
            ApprovalVerdict::Approved { approval_id, .. }
            | ApprovalVerdict::Expired { approval_id }
            | ApprovalVerdict::NotifyFailed { approval_id, .. } => Some(approval_id),
            ApprovalVerdict::Denied { approval_id, .. } => approval_id.as_deref(),
        }
    }
}

/// Obtains a human decision for a call. Must always return; expiry is a verdict.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(&self, request: &ToolCallRequest) -> ApprovalVerdict;
}

/// Durable record of every terminal pipeline outcome.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Returns the sequence number assigned to the persisted entry.
    async fn append(&self, record: AuditRecord) -> Result<u64, ToolError>;
}
