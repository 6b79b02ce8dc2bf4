pub mod log;
pub mod record;
pub mod redact;

pub use log::{AuditLog, AuditLogError, GENESIS_HASH};
pub use record::{
    AuditEntry, AuditQuery, AuditStats, BlockedCounts, DailyCounts, FactorStatus, InvalidEntry,
    ScoreFactor, SecurityScore, VerifyReport,
};
pub use redact::Redactor;
