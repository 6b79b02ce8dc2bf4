use crate::config::PolicyConfig;
use crate::risk::RiskTier;
use crate::trust::{SessionTrustRecord, SessionTrustStore};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAllowBasis {
    /// The tier is at or below the configured auto-approve ceiling.
    Ceiling,
    /// The session holds an unexpired trust grant covering the tier.
    SessionTrust,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    AutoAllow { basis: AutoAllowBasis, reason: String },
    AutoDeny { reason: String },
    NeedsHuman { reason: String },
}

impl PolicyDecision {
    pub fn reason(&self) -> &str {
        match self {
            PolicyDecision::AutoAllow { reason, .. }
            | PolicyDecision::AutoDeny { reason }
            | PolicyDecision::NeedsHuman { reason } => reason,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::AutoAllow { .. })
    }
}

/// Decides whether a call runs unattended, is refused, or waits for a human.
///
/// Rules are evaluated in order and the first match wins:
/// disabled, forced approval, auto-approve ceiling, session trust.
pub struct ApprovalPolicy {
    config: PolicyConfig,
    disabled: HashSet<String>,
    forced: HashSet<String>,
    trust: Arc<SessionTrustStore>,
}

impl ApprovalPolicy {
    pub fn new(config: PolicyConfig, trust: Arc<SessionTrustStore>) -> Self {
        let disabled = config.disabled_tools.iter().cloned().collect();
        let forced = config.forced_approval_tools.iter().cloned().collect();
        Self {
            config,
            disabled,
            forced,
            trust,
        }
    }

    pub fn is_disabled(&self, tool_name: &str) -> bool {
        self.disabled.contains(tool_name)
    }

    pub fn is_forced(&self, tool_name: &str) -> bool {
        self.forced.contains(tool_name)
    }

    pub fn decide(&self, tool_name: &str, risk: RiskTier, session_id: &str) -> PolicyDecision {
        if self.is_disabled(tool_name) {
            return PolicyDecision::AutoDeny {
                reason: "disabled".to_string(),
            };
        }

        if self.is_forced(tool_name) {
            return PolicyDecision::NeedsHuman {
                reason: format!("Tool '{}' requires explicit approval", tool_name),
            };
        }

        if risk <= self.config.auto_approve_risk_ceiling {
            return PolicyDecision::AutoAllow {
                basis: AutoAllowBasis::Ceiling,
                reason: format!(
                    "Auto-approved: {} is within the {} ceiling",
                    risk, self.config.auto_approve_risk_ceiling
                ),
            };
        }

        if self.config.session_trust_enabled {
            let current = self.trust.current_level(session_id);
            if risk <= current {
                return PolicyDecision::AutoAllow {
                    basis: AutoAllowBasis::SessionTrust,
                    reason: format!("Session trust: {} covers {}", current, risk),
                };
            }
        }

        PolicyDecision::NeedsHuman {
            reason: format!("Requires approval: {} ({})", tool_name, risk),
        }
    }

    /// Grant `level` to a session for the configured trust TTL.
    pub fn elevate_trust(&self, session_id: &str, level: RiskTier) -> SessionTrustRecord {
        self.trust.elevate(session_id, level, self.config.trust_ttl())
    }

    pub fn trust_store(&self) -> &Arc<SessionTrustStore> {
        &self.trust
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn policy(config: PolicyConfig) -> (Arc<ManualClock>, ApprovalPolicy) {
        let clock = Arc::new(ManualClock::default());
        let trust = Arc::new(SessionTrustStore::with_clock(clock.clone()));
        (clock, ApprovalPolicy::new(config, trust))
    }

    #[test]
    fn test_disabled_wins_over_everything() {
        let (_, policy) = policy(PolicyConfig {
            disabled_tools: vec!["file_read".to_string()],
            ..PolicyConfig::default()
        });
        let decision = policy.decide("file_read", RiskTier::Low, "s1");
        assert_eq!(
            decision,
            PolicyDecision::AutoDeny {
                reason: "disabled".to_string()
            }
        );
    }

    #[test]
    fn test_low_risk_auto_allowed_by_ceiling() {
        let (_, policy) = policy(PolicyConfig::default());
        let decision = policy.decide("file_read", RiskTier::Low, "s1");
        assert!(matches!(
            decision,
            PolicyDecision::AutoAllow {
                basis: AutoAllowBasis::Ceiling,
                ..
            }
        ));
    }

    #[test]
    fn test_forced_tool_needs_human_even_with_max_trust() {
        let (_, policy) = policy(PolicyConfig {
            forced_approval_tools: vec!["time_check".to_string()],
            ..PolicyConfig::default()
        });
        policy.elevate_trust("s1", RiskTier::Critical);
        let decision = policy.decide("time_check", RiskTier::Low, "s1");
        assert!(matches!(decision, PolicyDecision::NeedsHuman { .. }));
    }

    #[test]
    fn test_trust_substitutes_for_human_until_expiry() {
        let (clock, policy) = policy(PolicyConfig::default());
        assert!(matches!(
            policy.decide("file_write", RiskTier::Medium, "s1"),
            PolicyDecision::NeedsHuman { .. }
        ));

        policy.elevate_trust("s1", RiskTier::High);
        assert!(matches!(
            policy.decide("file_write", RiskTier::Medium, "s1"),
            PolicyDecision::AutoAllow {
                basis: AutoAllowBasis::SessionTrust,
                ..
            }
        ));
        assert!(matches!(
            policy.decide("computer_use", RiskTier::Critical, "s1"),
            PolicyDecision::NeedsHuman { .. }
        ));

        clock.advance(Duration::minutes(30) + Duration::milliseconds(1));
        assert!(matches!(
            policy.decide("file_write", RiskTier::Medium, "s1"),
            PolicyDecision::NeedsHuman { .. }
        ));
    }

    #[test]
    fn test_trust_ignored_when_disabled_in_config() {
        let (_, policy) = policy(PolicyConfig {
            session_trust_enabled: false,
            ..PolicyConfig::default()
        });
        policy.elevate_trust("s1", RiskTier::Critical);
        assert!(matches!(
            policy.decide("file_write", RiskTier::Medium, "s1"),
            PolicyDecision::NeedsHuman { .. }
        ));
    }

    #[test]
    fn test_raised_ceiling() {
        let (_, policy) = policy(PolicyConfig {
            auto_approve_risk_ceiling: RiskTier::High,
            ..PolicyConfig::default()
        });
        assert!(policy.decide("web_browse", RiskTier::Medium, "s1").is_allow());
        assert!(!policy.decide("unknown", RiskTier::Critical, "s1").is_allow());
    }
}
