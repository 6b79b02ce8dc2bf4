use crate::audit::AuditLog;
use async_trait::async_trait;
use toolgate_tools::{AuditRecord, AuditSink, ToolError};

#[async_trait]
impl AuditSink for AuditLog {
    async fn append(&self, record: AuditRecord) -> Result<u64, ToolError> {
        self.append_record(&record)
            .map(|entry| entry.seq)
            .map_err(|e| ToolError::AuditWriteFailed(e.to_string()))
    }
}
