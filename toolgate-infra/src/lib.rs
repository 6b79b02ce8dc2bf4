pub mod approval;
pub mod approval_adapter;
pub mod audit;
pub mod audit_adapter;
pub mod bootstrap;
pub mod config;

pub use approval::{
    ApprovalCoordinator, ApprovalDecision, ApprovalNotice, ApprovalRequest, ApprovalStatus,
    ApprovalTransport, ChannelTransport, ResolveOutcome, TallySnapshot, TransportError, VoteTally,
};
pub use audit::{
    AuditEntry, AuditLog, AuditLogError, AuditQuery, AuditStats, BlockedCounts, SecurityScore,
    VerifyReport,
};
pub use bootstrap::{BootstrapError, HousekeepingReport, Toolgate};
pub use config::{ApprovalConfig, AuditConfig, ConfigError, GateConfig};
