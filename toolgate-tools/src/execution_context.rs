use crate::request::ToolCallRequest;
use crate::sandbox::ExecutionLimits;
use serde::{Deserialize, Serialize};

/// What a tool sees about the call it is serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub call_id: String,
    pub session_id: String,
    pub requester_id: String,
    pub timeout_ms: u64,
    pub max_output_size: usize,
    /// Set when a human decision let the call through.
    pub approval_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        request: &ToolCallRequest,
        limits: &ExecutionLimits,
        approval_id: Option<String>,
    ) -> Self {
        Self {
            call_id: request.call_id.clone(),
            session_id: request.session_id.clone(),
            requester_id: request.requester_id.clone(),
            timeout_ms: limits.timeout_ms(),
            max_output_size: limits.max_output_size,
            approval_id,
        }
    }
}
