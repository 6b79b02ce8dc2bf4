use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use toolgate_policy::PolicyConfig;
use toolgate_tools::SandboxConfig;

pub const ENV_AUDIT_PATH: &str = "TOOLGATE_AUDIT_PATH";
pub const ENV_APPROVAL_TIMEOUT: &str = "TOOLGATE_APPROVAL_TIMEOUT";

/// Ten years.
const MAX_RESOLVED_RETENTION_MINUTES: u64 = 10 * 365 * 24 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApprovalConfig {
    pub approval_timeout_seconds: u64,
    /// Used instead of `approval_timeout_seconds` when more than one approver votes.
    pub vote_timeout_seconds: u64,
    /// Per-transport overrides, keyed by transport name.
    pub transport_timeouts: HashMap<String, u64>,
    /// How long finished requests stay queryable before housekeeping drops them.
    pub resolved_retention_minutes: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        let mut transport_timeouts = HashMap::new();
        transport_timeouts.insert("email".to_string(), 300);
        Self {
            approval_timeout_seconds: 60,
            vote_timeout_seconds: 120,
            transport_timeouts,
            resolved_retention_minutes: 60,
        }
    }
}

impl ApprovalConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_seconds)
    }

    pub fn vote_timeout(&self) -> Duration {
        Duration::from_secs(self.vote_timeout_seconds)
    }

    pub fn resolved_retention(&self) -> chrono::Duration {
        let minutes = self.resolved_retention_minutes.min(MAX_RESOLVED_RETENTION_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn transport_timeout(&self, transport: &str) -> Option<Duration> {
        self.transport_timeouts
            .get(transport)
            .map(|secs| Duration::from_secs(*secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub path: PathBuf,
    pub retention_days: u64,
    pub max_file_size_mb: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/audit.log"),
            retention_days: 90,
            max_file_size_mb: 50,
        }
    }
}

/// Everything the gate needs, one section per component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GateConfig {
    pub policy: PolicyConfig,
    pub sandbox: SandboxConfig,
    pub approval: ApprovalConfig,
    pub audit: AuditConfig,
}

impl GateConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Invalid(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_AUDIT_PATH).filter(|p| !p.trim().is_empty()) {
            self.audit.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_APPROVAL_TIMEOUT) {
            self.approval.approval_timeout_seconds = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_APPROVAL_TIMEOUT, raw
                ))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let positive = [
            ("approval.approval_timeout_seconds", self.approval.approval_timeout_seconds),
            ("approval.vote_timeout_seconds", self.approval.vote_timeout_seconds),
            ("sandbox.max_execution_time", self.sandbox.max_execution_time),
            ("sandbox.max_output_size", self.sandbox.max_output_size as u64),
            ("audit.retention_days", self.audit.retention_days),
            ("audit.max_file_size_mb", self.audit.max_file_size_mb),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }

        let zero_timeout = self
            .approval
            .transport_timeouts
            .iter()
            .find(|(_, secs)| **secs == 0);
        if let Some((transport, _)) = zero_timeout {
            return Err(ConfigError::Invalid(format!(
                "approval.transport_timeouts.{} must be greater than zero",
                transport
            )));
        }

        if self.audit.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("audit.path must not be empty".to_string()));
        }

        Ok(())
    }
}
