use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use toolgate_policy::RiskTier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// What a human approver is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub approval_id: String,
    pub session_id: String,
    pub requester_id: String,
    pub tool: String,
    pub risk: RiskTier,
    pub params: Value,
    pub approvers: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// A channel that can put an approval request in front of a human.
///
/// Decisions come back out of band through `ApprovalCoordinator::resolve`.
#[async_trait]
pub trait ApprovalTransport: Send + Sync {
    fn name(&self) -> &str;

    fn timeout_override(&self) -> Option<Duration> {
        None
    }

    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), TransportError>;
}

/// In-process transport: notices are delivered on a tokio channel.
pub struct ChannelTransport {
    name: String,
    sender: mpsc::UnboundedSender<ApprovalNotice>,
    timeout: Option<Duration>,
}

impl ChannelTransport {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ApprovalNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                sender,
                timeout: None,
            },
            receiver,
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ApprovalTransport for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), TransportError> {
        self.sender
            .send(notice.clone())
            .map_err(|_| TransportError::Closed)
    }
}
