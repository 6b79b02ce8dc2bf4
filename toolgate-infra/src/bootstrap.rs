use crate::approval::ApprovalCoordinator;
use crate::audit::{AuditLog, AuditLogError};
use crate::config::{ConfigError, GateConfig};
use std::sync::Arc;
use thiserror::Error;
use toolgate_policy::{ApprovalPolicy, Clock, RiskClassifier, SessionTrustStore, SystemClock};
use toolgate_tools::{SandboxChecker, ToolExecutionPipeline, ToolExecutor};
use tracing::info;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Audit log unavailable: {0}")]
    Audit(#[from] AuditLogError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub expired_trust: usize,
    pub purged_approvals: usize,
    pub pruned_segments: usize,
}

/// The assembled gate: one shared instance of every component.
pub struct Toolgate {
    pub config: GateConfig,
    pub trust: Arc<SessionTrustStore>,
    pub policy: Arc<ApprovalPolicy>,
    pub coordinator: Arc<ApprovalCoordinator>,
    pub audit: Arc<AuditLog>,
    pub pipeline: Arc<ToolExecutionPipeline>,
}

impl Toolgate {
    pub fn from_config(
        config: GateConfig,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<Self, BootstrapError> {
        Self::from_config_with_clock(config, executor, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(
        config: GateConfig,
        executor: Arc<dyn ToolExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BootstrapError> {
        config.validate()?;

        let classifier = Arc::new(RiskClassifier::with_overrides(&config.policy.risk_overrides));
        let trust = Arc::new(SessionTrustStore::with_clock(clock));
        let policy = Arc::new(ApprovalPolicy::new(config.policy.clone(), trust.clone()));
        let sandbox = Arc::new(SandboxChecker::new(&config.sandbox));
        let coordinator = Arc::new(ApprovalCoordinator::new(config.approval.clone()));
        let audit = Arc::new(AuditLog::with_rotation(
            &config.audit.path,
            config.audit.max_file_size_mb,
        )?);

        let pipeline = Arc::new(ToolExecutionPipeline::new(
            classifier,
            policy.clone(),
            sandbox,
            coordinator.clone(),
            executor,
            audit.clone(),
        ));

        info!(
            "Toolgate ready: ceiling={} audit={}",
            config.policy.auto_approve_risk_ceiling,
            config.audit.path.display()
        );

        Ok(Self {
            config,
            trust,
            policy,
            coordinator,
            audit,
            pipeline,
        })
    }

    /// Drop expired trust, stale approvals and audit segments past retention.
    pub fn housekeeping(&self) -> Result<HousekeepingReport, AuditLogError> {
        let report = HousekeepingReport {
            expired_trust: self.trust.purge_expired(),
            purged_approvals: self
                .coordinator
                .purge_resolved(self.config.approval.resolved_retention()),
            pruned_segments: self.audit.prune(self.config.audit.retention_days)?.len(),
        };
        info!("Housekeeping: {:?}", report);
        Ok(report)
    }
}
