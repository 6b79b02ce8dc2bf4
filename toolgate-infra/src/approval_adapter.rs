use crate::approval::ApprovalCoordinator;
use async_trait::async_trait;
use toolgate_tools::{ApprovalGate, ApprovalVerdict, ToolCallRequest};

#[async_trait]
impl ApprovalGate for ApprovalCoordinator {
    async fn request_approval(&self, request: &ToolCallRequest) -> ApprovalVerdict {
        self.request(request).await
    }
}
