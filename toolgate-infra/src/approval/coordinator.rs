use super::tally::{ApprovalStatus, TallySnapshot, VoteTally};
use super::transport::{ApprovalNotice, ApprovalTransport};
use crate::config::ApprovalConfig;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use toolgate_tools::metrics;
use toolgate_tools::{ApprovalVerdict, ToolCallRequest};
use tracing::{debug, error, info, warn};

pub const REASON_SESSION_CLOSED: &str = "session closed";
pub const REASON_CANCELLED: &str = "cancelled";
pub const REASON_NO_TRANSPORT: &str = "no approval transport registered for session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Deny,
    /// Approve, and trust the session up to this call's tier.
    Trust,
}

impl ApprovalDecision {
    pub fn approves(&self) -> bool {
        !matches!(self, ApprovalDecision::Deny)
    }
}

/// Point-in-time view of an approval request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub call: ToolCallRequest,
    pub approvers: Vec<String>,
    pub status: ApprovalStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub trust_granted: bool,
    pub tally: Option<TallySnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// This decision made the request terminal.
    Resolved { status: ApprovalStatus },
    /// Vote counted; the tally is still open.
    Recorded { tally: TallySnapshot },
    AlreadyResolved { status: ApprovalStatus },
    NotEligible,
    UnknownRequest,
}

struct EntryState {
    status: ApprovalStatus,
    reason: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    trust_granted: bool,
    tally: Option<VoteTally>,
    done: Option<oneshot::Sender<()>>,
}

impl EntryState {
    /// Move to a terminal status once. Later calls are no-ops.
    fn finish(&mut self, status: ApprovalStatus, reason: String, by: Option<&str>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.reason = Some(reason);
        self.resolved_at = Some(Utc::now());
        self.resolved_by = by.map(str::to_string);
        if let Some(done) = self.done.take() {
            // The waiter may already be gone.
            let _ = done.send(());
        }
        metrics::record_approval_resolution(status.as_str());
        true
    }
}

struct Entry {
    approval_id: String,
    call: ToolCallRequest,
    approvers: Vec<String>,
    created_at: DateTime<Utc>,
    state: Mutex<EntryState>,
}

impl Entry {
    /// An empty approver list lets anyone on the session's channel decide.
    fn is_eligible(&self, approver: &str) -> bool {
        self.approvers.is_empty() || self.approvers.iter().any(|a| a == approver)
    }

    fn snapshot(&self) -> ApprovalRequest {
        let state = self.state.lock();
        ApprovalRequest {
            approval_id: self.approval_id.clone(),
            call: self.call.clone(),
            approvers: self.approvers.clone(),
            status: state.status,
            reason: state.reason.clone(),
            created_at: self.created_at,
            resolved_at: state.resolved_at,
            resolved_by: state.resolved_by.clone(),
            trust_granted: state.trust_granted,
            tally: state.tally.as_ref().map(VoteTally::snapshot),
        }
    }

    fn verdict(&self) -> ApprovalVerdict {
        let state = self.state.lock();
        match state.status {
            ApprovalStatus::Approved => ApprovalVerdict::Approved {
                approval_id: self.approval_id.clone(),
                approver: state.resolved_by.clone().unwrap_or_default(),
                elevate_trust: state.trust_granted,
            },
            ApprovalStatus::Expired => ApprovalVerdict::Expired {
                approval_id: self.approval_id.clone(),
            },
            ApprovalStatus::Denied | ApprovalStatus::Pending => ApprovalVerdict::Denied {
                approval_id: Some(self.approval_id.clone()),
                reason: state
                    .reason
                    .clone()
                    .unwrap_or_else(|| "approval ended without a decision".to_string()),
            },
        }
    }
}

struct SessionChannel {
    transport: Arc<dyn ApprovalTransport>,
    approvers: Vec<String>,
}

/// Tracks pending human decisions and wakes the waiting call when one lands.
///
/// The registry lock is only held to insert or look up entries; all state
/// changes happen under the entry's own lock, so `resolve` never awaits.
pub struct ApprovalCoordinator {
    config: ApprovalConfig,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    sessions: RwLock<HashMap<String, SessionChannel>>,
}

impl ApprovalCoordinator {
    pub fn new(config: ApprovalConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a session to the channel its approvals go out on.
    pub fn register_session(
        &self,
        session_id: &str,
        transport: Arc<dyn ApprovalTransport>,
        approvers: Vec<String>,
    ) {
        info!(
            "Approval channel registered: session={} transport={} approvers={}",
            session_id,
            transport.name(),
            approvers.len()
        );
        self.sessions.write().insert(
            session_id.to_string(),
            SessionChannel {
                transport,
                approvers,
            },
        );
    }

    /// Disconnect a session. Its pending approvals are denied.
    pub fn unregister_session(&self, session_id: &str) -> usize {
        self.sessions.write().remove(session_id);

        let pending: Vec<Arc<Entry>> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.call.session_id == session_id)
            .cloned()
            .collect();

        let denied = pending
            .iter()
            .filter(|entry| {
                entry
                    .state
                    .lock()
                    .finish(ApprovalStatus::Denied, REASON_SESSION_CLOSED.to_string(), None)
            })
            .count();

        info!(
            "Approval channel closed: session={} denied_pending={}",
            session_id, denied
        );
        denied
    }

    /// Ask the session's registered approvers.
    pub async fn request(&self, call: &ToolCallRequest) -> ApprovalVerdict {
        self.request_from(call, Vec::new()).await
    }

    /// Ask `approvers`, or the session's registered approvers when empty.
    pub async fn request_from(
        &self,
        call: &ToolCallRequest,
        approvers: Vec<String>,
    ) -> ApprovalVerdict {
        let channel = {
            let sessions = self.sessions.read();
            sessions
                .get(&call.session_id)
                .map(|channel| (channel.transport.clone(), channel.approvers.clone()))
        };
        let Some((transport, registered)) = channel else {
            warn!(
                "No approval channel for session {}, denying {}",
                call.session_id, call.tool_name
            );
            metrics::record_approval_resolution(ApprovalStatus::Denied.as_str());
            return ApprovalVerdict::Denied {
                approval_id: None,
                reason: REASON_NO_TRANSPORT.to_string(),
            };
        };

        let mut approvers = if approvers.is_empty() {
            registered
        } else {
            approvers
        };
        approvers.sort();
        approvers.dedup();

        let wait = self.timeout_for(transport.as_ref(), approvers.len());
        let approval_id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let (done_tx, done_rx) = oneshot::channel();

        let entry = Arc::new(Entry {
            approval_id: approval_id.clone(),
            call: call.clone(),
            approvers: approvers.clone(),
            created_at,
            state: Mutex::new(EntryState {
                status: ApprovalStatus::Pending,
                reason: None,
                resolved_at: None,
                resolved_by: None,
                trust_granted: false,
                tally: (approvers.len() > 1).then(|| VoteTally::new(approvers.len())),
                done: Some(done_tx),
            }),
        });

        // Insert under the sessions lock so `unregister_session` either ran
        // before (and we see it here) or will find this entry.
        let still_registered = {
            let sessions = self.sessions.read();
            self.entries.write().insert(approval_id.clone(), entry.clone());
            sessions.contains_key(&call.session_id)
        };
        if !still_registered {
            warn!(
                "Session {} closed while requesting approval {}",
                call.session_id, approval_id
            );
            entry.state.lock().finish(
                ApprovalStatus::Denied,
                REASON_SESSION_CLOSED.to_string(),
                None,
            );
            return entry.verdict();
        }

        info!(
            "Approval requested: id={} session={} tool={} risk={} timeout={}s via {}",
            approval_id,
            call.session_id,
            call.tool_name,
            call.risk,
            wait.as_secs(),
            transport.name()
        );

        let mut guard = CancelOnDrop(Some(entry.clone()));

        let notice = ApprovalNotice {
            approval_id: approval_id.clone(),
            session_id: call.session_id.clone(),
            requester_id: call.requester_id.clone(),
            tool: call.tool_name.clone(),
            risk: call.risk,
            params: call.params.clone(),
            approvers,
            expires_at: chrono::Duration::from_std(wait)
                .ok()
                .and_then(|d| created_at.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        if let Err(e) = transport.notify(&notice).await {
            error!(
                "Approval notify failed: id={} transport={}: {}",
                approval_id,
                transport.name(),
                e
            );
            entry.state.lock().finish(
                ApprovalStatus::Denied,
                format!("transport notify failed: {}", e),
                None,
            );
            guard.disarm();
            return ApprovalVerdict::NotifyFailed {
                approval_id,
                detail: e.to_string(),
            };
        }

        let waited = tokio::time::timeout(wait, done_rx).await;
        guard.disarm();

        if waited.is_err() {
            let expired = entry.state.lock().finish(
                ApprovalStatus::Expired,
                format!("no decision within {}s", wait.as_secs()),
                None,
            );
            if expired {
                warn!("Approval expired: id={} tool={}", approval_id, call.tool_name);
            }
        }

        let verdict = entry.verdict();
        debug!("Approval {} finished: {:?}", approval_id, verdict);
        verdict
    }

    /// Record one approver's decision. Never blocks on the waiting call.
    pub fn resolve(
        &self,
        approval_id: &str,
        approver: &str,
        decision: ApprovalDecision,
    ) -> ResolveOutcome {
        let Some(entry) = self.entries.read().get(approval_id).cloned() else {
            warn!("Resolve for unknown approval {}", approval_id);
            return ResolveOutcome::UnknownRequest;
        };

        if !entry.is_eligible(approver) {
            warn!(
                "Approver {} is not eligible for approval {}",
                approver, approval_id
            );
            return ResolveOutcome::NotEligible;
        }

        let mut state = entry.state.lock();
        if state.status.is_terminal() {
            debug!(
                "Approval {} already {}, ignoring {:?} from {}",
                approval_id,
                state.status.as_str(),
                decision,
                approver
            );
            return ResolveOutcome::AlreadyResolved {
                status: state.status,
            };
        }

        let status = match state.tally.as_mut() {
            Some(tally) => {
                let snapshot = tally.cast(approver, decision.approves());
                if !snapshot.status.is_terminal() {
                    info!(
                        "Vote recorded: id={} approver={} approve={}/{} deny={}",
                        approval_id, approver, snapshot.approve, snapshot.required, snapshot.deny
                    );
                    return ResolveOutcome::Recorded { tally: snapshot };
                }
                snapshot.status
            }
            None if decision.approves() => ApprovalStatus::Approved,
            None => ApprovalStatus::Denied,
        };

        state.trust_granted =
            status == ApprovalStatus::Approved && decision == ApprovalDecision::Trust;
        let reason = match (status, state.tally.is_some()) {
            (ApprovalStatus::Approved, true) => "approved by vote".to_string(),
            (ApprovalStatus::Approved, false) => format!("approved by {}", approver),
            (_, true) => "denied by vote".to_string(),
            (_, false) => format!("denied by {}", approver),
        };
        state.finish(status, reason, Some(approver));

        info!(
            "Approval resolved: id={} status={} by={} trust={}",
            approval_id,
            status.as_str(),
            approver,
            state.trust_granted
        );
        ResolveOutcome::Resolved { status }
    }

    pub fn status(&self, approval_id: &str) -> Option<ApprovalRequest> {
        let entry = self.entries.read().get(approval_id).cloned();
        entry.map(|entry| entry.snapshot())
    }

    pub fn pending_for_session(&self, session_id: &str) -> Vec<ApprovalRequest> {
        let entries: Vec<Arc<Entry>> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.call.session_id == session_id)
            .cloned()
            .collect();

        let mut pending: Vec<ApprovalRequest> = entries
            .iter()
            .map(|entry| entry.snapshot())
            .filter(|request| request.status == ApprovalStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    /// Forget terminal requests resolved more than `max_age` ago.
    pub fn purge_resolved(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            let state = entry.state.lock();
            !state.status.is_terminal() || state.resolved_at.map_or(true, |at| at > cutoff)
        });
        before - entries.len()
    }

    fn timeout_for(&self, transport: &dyn ApprovalTransport, approvers: usize) -> Duration {
        transport
            .timeout_override()
            .or_else(|| self.config.transport_timeout(transport.name()))
            .unwrap_or_else(|| {
                if approvers > 1 {
                    self.config.vote_timeout()
                } else {
                    self.config.approval_timeout()
                }
            })
    }
}

/// Denies the entry if the waiting call is dropped before it finishes.
struct CancelOnDrop(Option<Arc<Entry>>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(entry) = self.0.take() {
            let cancelled = entry.state.lock().finish(
                ApprovalStatus::Denied,
                REASON_CANCELLED.to_string(),
                None,
            );
            if cancelled {
                warn!("Approval wait abandoned: id={}", entry.approval_id);
            }
        }
    }
}
