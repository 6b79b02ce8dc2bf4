use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use toolgate_policy::RiskTier;
use toolgate_tools::AuditOutcome;

/// One persisted audit line, without its chain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    /// RFC 3339, UTC, millisecond precision.
    pub ts: String,
    pub call_id: String,
    pub session_id: String,
    pub requester_id: String,
    pub tool: String,
    pub risk: RiskTier,
    /// Redacted parameters.
    pub params: Value,
    /// SHA-256 hex of the redacted parameters' JSON.
    pub params_digest: String,
    pub outcome: AuditOutcome,
    pub detail: String,
    pub approval_id: Option<String>,
    pub approver: Option<String>,
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.ts)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChainedEntry {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub prev_hash: String,
    pub hash: String,
}

/// Filters for reading the log back. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub session: Option<String>,
    pub tool: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(session) = &self.session {
            if &entry.session_id != session {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if &entry.tool != tool {
                return false;
            }
        }
        if self.since.is_some() || self.until.is_some() {
            let Some(ts) = entry.timestamp() else {
                return false;
            };
            if self.since.is_some_and(|since| ts < since) {
                return false;
            }
            if self.until.is_some_and(|until| ts > until) {
                return false;
            }
        }
        true
    }
}

/// Daily aggregate over one UTC date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditStats {
    pub date: NaiveDate,
    pub total: u64,
    pub by_outcome: BTreeMap<String, u64>,
    pub by_risk: BTreeMap<String, u64>,
    /// Most used tools, highest count first.
    pub top_tools: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidEntry {
    pub segment: String,
    pub line: usize,
    pub seq: Option<u64>,
    pub reason: String,
}

/// Result of re-walking the whole chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyReport {
    pub entries: u64,
    pub segments: usize,
    pub invalid: Vec<InvalidEntry>,
    /// Sequence number of the first entry that failed.
    pub first_divergence: Option<u64>,
    pub last_hash: String,
}

impl VerifyReport {
    pub fn is_intact(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Calls that ran versus calls the gate stopped, for one UTC date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub approved: u64,
    pub blocked: u64,
}

/// Day-by-day gate decisions over a trailing window, oldest day first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedCounts {
    pub days: u32,
    pub daily: Vec<DailyCounts>,
    pub total_approved: u64,
    pub total_blocked: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorStatus {
    Ok,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreFactor {
    pub name: String,
    pub status: FactorStatus,
    pub detail: String,
}

/// Coarse health grade derived from the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityScore {
    pub date: NaiveDate,
    /// 0 to 100.
    pub score: u8,
    /// `A` (90+), `B` (70+), `C` (50+) or `D`.
    pub grade: char,
    pub factors: Vec<ScoreFactor>,
    pub recommendations: Vec<String>,
}
