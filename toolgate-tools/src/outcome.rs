use crate::error::SandboxViolation;
use crate::request::ToolCallRequest;
use crate::tools::ToolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_policy::RiskTier;

/// What the caller of the pipeline gets back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Allowed { result: ToolResult },
    Denied { reason: String },
    SandboxRejected { violation: SandboxViolation },
    Error { detail: String },
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Allowed { .. } => "allowed",
            PipelineOutcome::Denied { .. } => "denied",
            PipelineOutcome::SandboxRejected { .. } => "sandbox_rejected",
            PipelineOutcome::Error { .. } => "error",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PipelineOutcome::Allowed { .. })
    }
}

/// Terminal state recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Disabled,
    SandboxRejected,
    Denied,
    Expired,
    Cancelled,
    Executed,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Disabled => "disabled",
            AuditOutcome::SandboxRejected => "sandbox_rejected",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Expired => "expired",
            AuditOutcome::Cancelled => "cancelled",
            AuditOutcome::Executed => "executed",
            AuditOutcome::Failed => "failed",
        }
    }

    /// Whether the tool body actually ran.
    pub fn ran(&self) -> bool {
        matches!(self, AuditOutcome::Executed | AuditOutcome::Failed)
    }
}

/// One call's terminal outcome as handed to the audit sink, before redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub call_id: String,
    pub session_id: String,
    pub requester_id: String,
    pub tool: String,
    pub risk: RiskTier,
    pub params: Value,
    pub outcome: AuditOutcome,
    pub detail: String,
    pub approval_id: Option<String>,
    pub approver: Option<String>,
    pub duration_ms: Option<u64>,
}

impl AuditRecord {
    pub fn for_request(
        request: &ToolCallRequest,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            call_id: request.call_id.clone(),
            session_id: request.session_id.clone(),
            requester_id: request.requester_id.clone(),
            tool: request.tool_name.clone(),
            risk: request.risk,
            params: request.params.clone(),
            outcome,
            detail: detail.into(),
            approval_id: None,
            approver: None,
            duration_ms: None,
        }
    }
}
