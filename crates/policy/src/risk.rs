use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How dangerous a tool call is. Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "critical" => Ok(RiskTier::Critical),
            other => Err(PolicyError::UnknownTier(other.to_string())),
        }
    }
}

const BUILTIN_TIERS: &[(&str, RiskTier)] = &[
    ("file_read", RiskTier::Low),
    ("file_search", RiskTier::Low),
    ("web_search", RiskTier::Low),
    ("screenshot", RiskTier::Low),
    ("get_time", RiskTier::Low),
    ("get_version", RiskTier::Low),
    ("memory_search", RiskTier::Low),
    ("memory_store", RiskTier::Low),
    ("calendar_read", RiskTier::Low),
    ("clipboard_read", RiskTier::Low),
    ("session_clear", RiskTier::Low),
    ("schedule_add", RiskTier::Low),
    ("schedule_list", RiskTier::Low),
    ("schedule_remove", RiskTier::Low),
    ("schedule_enable", RiskTier::Low),
    ("schedule_disable", RiskTier::Low),
    ("schedule_update", RiskTier::Low),
    ("file_write", RiskTier::Medium),
    ("web_browse", RiskTier::Medium),
    ("clipboard_write", RiskTier::Medium),
    ("desktop_control", RiskTier::Medium),
    ("calendar_write", RiskTier::Medium),
    ("delegate_to_agent", RiskTier::Medium),
    ("workflow_run", RiskTier::Medium),
    ("shell_execute", RiskTier::High),
    ("computer_use", RiskTier::High),
    ("send_message", RiskTier::High),
    ("system_update", RiskTier::High),
];

/// Static tool name to risk tier lookup. Unknown tools are `Critical`.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    table: HashMap<String, RiskTier>,
}

impl RiskClassifier {
    pub fn new() -> Self {
        Self {
            table: BUILTIN_TIERS
                .iter()
                .map(|(name, tier)| (name.to_string(), *tier))
                .collect(),
        }
    }

    pub fn with_overrides(overrides: &HashMap<String, RiskTier>) -> Self {
        let mut classifier = Self::new();
        for (tool, tier) in overrides {
            classifier.set(tool.clone(), *tier);
        }
        classifier
    }

    pub fn set(&mut self, tool: impl Into<String>, tier: RiskTier) -> &mut Self {
        self.table.insert(tool.into(), tier);
        self
    }

    pub fn classify(&self, tool_name: &str) -> RiskTier {
        self.table
            .get(tool_name)
            .copied()
            .unwrap_or(RiskTier::Critical)
    }

    pub fn is_known(&self, tool_name: &str) -> bool {
        self.table.contains_key(tool_name)
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}
