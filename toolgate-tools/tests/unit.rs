#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use toolgate_policy::{RiskClassifier, RiskTier};
    use toolgate_tools::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo input back"
        }

        async fn execute(
            &self,
            _ctx: ExecutionContext,
            input: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(input))
        }
    }

    fn context() -> ExecutionContext {
        let request = ToolCallRequest::with_risk("echo", json!({}), RiskTier::Low, "s", "u");
        ExecutionContext::new(&request, &ExecutionLimits::default(), None)
    }

    #[tokio::test]
    async fn test_registry_register_and_get() {
        let mut registry = ToolRegistryImpl::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.list(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_registry_as_executor() {
        let mut registry = ToolRegistryImpl::new();
        registry.register(Arc::new(EchoTool));
        let executor: Arc<dyn ToolExecutor> = Arc::new(registry);

        let result = executor
            .execute("echo", json!({"message": "hello"}), context())
            .await
            .unwrap();
        assert_eq!(result.output, Some(json!({"message": "hello"})));

        let missing = executor.execute("nope", json!({}), context()).await;
        assert_eq!(missing.unwrap_err(), ToolError::NotFound("nope".into()));
    }

    #[test]
    fn test_request_classified_once_at_creation() {
        let classifier = RiskClassifier::new();
        let request = ToolCallRequest::new(&classifier, "shell_execute", json!({}), "s1", "u1");
        assert_eq!(request.risk, RiskTier::High);
        assert_eq!(request.session_id, "s1");
        assert_eq!(request.requester_id, "u1");

        let other = ToolCallRequest::new(&classifier, "shell_execute", json!({}), "s1", "u1");
        assert_ne!(request.call_id, other.call_id);
    }

    #[test]
    fn test_execution_context_carries_limits() {
        let request = ToolCallRequest::with_risk("echo", json!({}), RiskTier::Low, "s", "u");
        let limits = ExecutionLimits::new(std::time::Duration::from_millis(1500), 64);
        let ctx = ExecutionContext::new(&request, &limits, Some("apr".into()));
        assert_eq!(ctx.timeout_ms, 1500);
        assert_eq!(ctx.max_output_size, 64);
        assert_eq!(ctx.call_id, request.call_id);
        assert_eq!(ctx.approval_id.as_deref(), Some("apr"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::SandboxRejected {
            violation: SandboxViolation::Timeout { limit_ms: 30000 },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "sandbox_rejected");
        assert_eq!(value["violation"]["kind"], "timeout");
        assert_eq!(value["violation"]["limit_ms"], 30000);
        assert_eq!(outcome.label(), "sandbox_rejected");

        assert_eq!(
            serde_json::to_value(AuditOutcome::SandboxRejected).unwrap(),
            "sandbox_rejected"
        );
        assert!(AuditOutcome::Failed.ran());
        assert!(!AuditOutcome::Expired.ran());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ToolError::ApprovalDenied {
                reason: "nope".into()
            }
            .to_string(),
            "Approval denied: nope"
        );
        let violation: ToolError = SandboxViolation::path("outside").into();
        assert_eq!(violation.to_string(), "Sandbox violation: path: outside");
    }
}
