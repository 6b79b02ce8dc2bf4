use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallySnapshot {
    pub approve: usize,
    pub deny: usize,
    pub required: usize,
    pub total: usize,
    pub status: ApprovalStatus,
}

/// Strict-majority vote over a fixed set of approvers.
///
/// The denominator is fixed at creation. Each approver holds at most one
/// vote; voting again replaces it. Once decided the tally ignores votes.
#[derive(Debug, Clone)]
pub struct VoteTally {
    total: usize,
    required: usize,
    votes: HashMap<String, bool>,
    status: ApprovalStatus,
}

impl VoteTally {
    pub fn new(total_approvers: usize) -> Self {
        Self {
            total: total_approvers,
            required: total_approvers / 2 + 1,
            votes: HashMap::new(),
            status: ApprovalStatus::Pending,
        }
    }

    pub fn cast(&mut self, approver: &str, approve: bool) -> TallySnapshot {
        if self.status.is_terminal() {
            return self.snapshot();
        }

        self.votes.insert(approver.to_string(), approve);

        let (approvals, denials) = self.counts();
        if approvals >= self.required {
            self.status = ApprovalStatus::Approved;
        } else if denials > self.total.saturating_sub(self.required) {
            self.status = ApprovalStatus::Denied;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let (approve, deny) = self.counts();
        TallySnapshot {
            approve,
            deny,
            required: self.required,
            total: self.total,
            status: self.status,
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn counts(&self) -> (usize, usize) {
        let approvals = self.votes.values().filter(|approve| **approve).count();
        (approvals, self.votes.len() - approvals)
    }
}
