use crate::error::PolicyError;
use crate::risk::RiskTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One year. Longer grants are clamped.
const MAX_TRUST_TTL_MINUTES: u64 = 60 * 24 * 365;

/// Approval policy settings, the `policy:` section of the gate config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Calls at or below this tier run without a human decision.
    pub auto_approve_risk_ceiling: RiskTier,
    /// Tools that always need a human, whatever their tier or the session trust.
    pub forced_approval_tools: Vec<String>,
    /// Tools that are never allowed to run.
    pub disabled_tools: Vec<String>,
    pub session_trust_enabled: bool,
    pub trust_ttl_minutes: u64,
    pub risk_overrides: HashMap<String, RiskTier>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_approve_risk_ceiling: RiskTier::Low,
            forced_approval_tools: vec!["shell_execute".to_string(), "send_message".to_string()],
            disabled_tools: Vec::new(),
            session_trust_enabled: true,
            trust_ttl_minutes: 30,
            risk_overrides: HashMap::new(),
        }
    }
}

impl PolicyConfig {
    pub fn trust_ttl(&self) -> chrono::Duration {
        let minutes = self.trust_ttl_minutes.min(MAX_TRUST_TTL_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.session_trust_enabled && self.trust_ttl_minutes == 0 {
            return Err(PolicyError::InvalidConfig(
                "trust_ttl_minutes must be positive when session trust is enabled".into(),
            ));
        }

        if let Some(tool) = self
            .forced_approval_tools
            .iter()
            .find(|tool| self.disabled_tools.contains(tool))
        {
            return Err(PolicyError::InvalidConfig(format!(
                "Tool '{}' is both disabled and forced to require approval",
                tool
            )));
        }

        Ok(())
    }
}
