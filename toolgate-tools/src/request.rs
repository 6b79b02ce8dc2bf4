use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_policy::{RiskClassifier, RiskTier};

/// A single tool invocation travelling through the pipeline.
///
/// The risk tier is fixed when the request is built and never re-derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub params: Value,
    pub risk: RiskTier,
    pub session_id: String,
    pub requester_id: String,
    pub created_at: DateTime<Utc>,
}

impl ToolCallRequest {
    pub fn new(
        classifier: &RiskClassifier,
        tool_name: impl Into<String>,
        params: Value,
        session_id: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        let tool_name = tool_name.into();
        let risk = classifier.classify(&tool_name);
        Self::with_risk(tool_name, params, risk, session_id, requester_id)
    }

    pub fn with_risk(
        tool_name: impl Into<String>,
        params: Value,
        risk: RiskTier,
        session_id: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            params,
            risk,
            session_id: session_id.into(),
            requester_id: requester_id.into(),
            created_at: Utc::now(),
        }
    }
}
