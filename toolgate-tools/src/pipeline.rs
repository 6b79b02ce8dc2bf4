use crate::error::{SandboxViolation, ToolError};
use crate::execution_context::ExecutionContext;
use crate::metrics::{self, MetricTimer};
use crate::outcome::{AuditOutcome, AuditRecord, PipelineOutcome};
use crate::request::ToolCallRequest;
use crate::sandbox::{ExecutionLimits, SandboxChecker};
use crate::tools::ToolResult;
use crate::traits::{ApprovalGate, ApprovalVerdict, AuditSink, ToolExecutor};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout, Duration};
use toolgate_policy::{ApprovalPolicy, PolicyDecision, RiskClassifier};
use tracing::{debug, error, info, warn};

const AUDIT_ATTEMPTS: u32 = 3;
const AUDIT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Gates every tool call: disabled check, sandbox, approval, guarded
/// execution, then exactly one audit entry.
pub struct ToolExecutionPipeline {
    classifier: Arc<RiskClassifier>,
    policy: Arc<ApprovalPolicy>,
    sandbox: Arc<SandboxChecker>,
    approvals: Arc<dyn ApprovalGate>,
    executor: Arc<dyn ToolExecutor>,
    audit: Arc<dyn AuditSink>,
}

impl ToolExecutionPipeline {
    pub fn new(
        classifier: Arc<RiskClassifier>,
        policy: Arc<ApprovalPolicy>,
        sandbox: Arc<SandboxChecker>,
        approvals: Arc<dyn ApprovalGate>,
        executor: Arc<dyn ToolExecutor>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            classifier,
            policy,
            sandbox,
            approvals,
            executor,
            audit,
        }
    }

    pub fn policy(&self) -> &Arc<ApprovalPolicy> {
        &self.policy
    }

    /// Classify and run a call in one step.
    pub async fn dispatch(
        &self,
        session_id: &str,
        requester_id: &str,
        tool_name: &str,
        params: Value,
    ) -> PipelineOutcome {
        let request = ToolCallRequest::new(
            &self.classifier,
            tool_name,
            params,
            session_id,
            requester_id,
        );
        self.run(request).await
    }

    pub async fn run(&self, request: ToolCallRequest) -> PipelineOutcome {
        info!(
            "Gating tool call: tool={} session={} risk={} call_id={}",
            request.tool_name, request.session_id, request.risk, request.call_id
        );

        // Armed until the terminal entry is durable; a dropped call is audited as cancelled.
        let mut pending = PendingAudit::new(
            self.audit.clone(),
            AuditRecord::for_request(
                &request,
                AuditOutcome::Cancelled,
                "caller abandoned the call before it finished",
            ),
        );

        let (outcome, record) = self.evaluate(&request).await;
        metrics::record_pipeline_outcome(record.outcome.as_str());
        pending.replace(record.clone());

        let appended = self.append_with_retry(record).await;
        pending.complete();

        match appended {
            Ok(seq) => {
                debug!("Audited call {} as entry {}", request.call_id, seq);
                outcome
            }
            Err(e) => {
                error!("Audit write failed for call {}: {}", request.call_id, e);
                PipelineOutcome::Error {
                    detail: format!("audit write failed: {}", e),
                }
            }
        }
    }

    async fn evaluate(&self, request: &ToolCallRequest) -> (PipelineOutcome, AuditRecord) {
        // 1. Disabled tools stop here
        if self.policy.is_disabled(&request.tool_name) {
            let reason = ToolError::ToolDisabled(request.tool_name.clone()).to_string();
            warn!("{}", reason);
            return (
                PipelineOutcome::Denied {
                    reason: reason.clone(),
                },
                AuditRecord::for_request(request, AuditOutcome::Disabled, reason),
            );
        }

        // 2. Static sandbox checks, before anyone is asked
        if let Err(violation) = self.sandbox.check(request) {
            warn!("Sandbox rejected {}: {}", request.tool_name, violation);
            return sandbox_rejected(request, violation, None);
        }

        // 3. Approval
        let mut approval_id = None;
        let mut approver = None;
        match self
            .policy
            .decide(&request.tool_name, request.risk, &request.session_id)
        {
            PolicyDecision::AutoAllow { reason, .. } => {
                debug!("{}", reason);
            }
            PolicyDecision::AutoDeny { reason } => {
                return (
                    PipelineOutcome::Denied {
                        reason: reason.clone(),
                    },
                    AuditRecord::for_request(request, AuditOutcome::Denied, reason),
                );
            }
            PolicyDecision::NeedsHuman { reason } => {
                info!("Awaiting approval for call {}: {}", request.call_id, reason);
                let timer = MetricTimer::new(metrics::record_approval_wait);
                let verdict = self.approvals.request_approval(request).await;
                drop(timer);

                match verdict {
                    ApprovalVerdict::Approved {
                        approval_id: id,
                        approver: who,
                        elevate_trust,
                    } => {
                        if elevate_trust {
                            self.policy.elevate_trust(&request.session_id, request.risk);
                        }
                        approval_id = Some(id);
                        approver = Some(who);
                    }
                    verdict => return denied_by_verdict(request, verdict),
                }
            }
        }

        // 4. Execute under limits
        let limits = *self.sandbox.limits();
        let ctx = ExecutionContext::new(request, &limits, approval_id.clone());
        let timer = MetricTimer::new(metrics::record_tool_latency);
        let result = self.execute_with_protection(request, ctx, &limits).await;
        let duration_ms = timer.elapsed_ms();
        drop(timer);

        let (outcome, mut record) = match result {
            Ok(result) => executed(request, result, &limits),
            Err(ToolError::SandboxViolation(violation)) => {
                sandbox_rejected(request, violation, approval_id.clone())
            }
            Err(e) => {
                let detail = e.to_string();
                (
                    PipelineOutcome::Error {
                        detail: detail.clone(),
                    },
                    AuditRecord::for_request(request, AuditOutcome::Failed, detail),
                )
            }
        };
        record.approval_id = approval_id;
        record.approver = approver;
        record.duration_ms = Some(duration_ms);
        (outcome, record)
    }

    async fn execute_with_protection(
        &self,
        request: &ToolCallRequest,
        ctx: ExecutionContext,
        limits: &ExecutionLimits,
    ) -> Result<ToolResult, ToolError> {
        let executor = self.executor.clone();
        let tool_name = request.tool_name.clone();
        let params = request.params.clone();

        // Spawn task to isolate panics
        let mut handle =
            tokio::spawn(async move { executor.execute(&tool_name, params, ctx).await });
        let _abort = AbortOnDrop(handle.abort_handle());

        match timeout(limits.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Tool execution panicked: {}", request.tool_name);
                    Err(ToolError::ExecutionFailed("tool panicked".into()))
                } else {
                    error!("Tool execution cancelled: {}", request.tool_name);
                    Err(ToolError::ExecutionFailed("tool task cancelled".into()))
                }
            }
            Err(_) => {
                warn!(
                    "Tool execution timed out after {}ms: {}",
                    limits.timeout_ms(),
                    request.tool_name
                );
                Err(ToolError::SandboxViolation(limits.timeout_violation()))
            }
        }
    }

    async fn append_with_retry(&self, record: AuditRecord) -> Result<u64, ToolError> {
        let mut attempt = 1;
        loop {
            match self.audit.append(record.clone()).await {
                Ok(seq) => return Ok(seq),
                Err(e) if attempt < AUDIT_ATTEMPTS => {
                    warn!(
                        "Audit append attempt {}/{} failed: {}",
                        attempt, AUDIT_ATTEMPTS, e
                    );
                    attempt += 1;
                    sleep(AUDIT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn executed(
    request: &ToolCallRequest,
    result: ToolResult,
    limits: &ExecutionLimits,
) -> (PipelineOutcome, AuditRecord) {
    if let Err(violation) = limits.check_output(result.output.as_ref()) {
        return sandbox_rejected(request, violation, None);
    }

    if result.success {
        let summary = result
            .output
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        (
            PipelineOutcome::Allowed { result },
            AuditRecord::for_request(request, AuditOutcome::Executed, summary),
        )
    } else {
        let detail = result
            .error
            .unwrap_or_else(|| "tool reported failure".to_string());
        (
            PipelineOutcome::Error {
                detail: detail.clone(),
            },
            AuditRecord::for_request(request, AuditOutcome::Failed, detail),
        )
    }
}

fn sandbox_rejected(
    request: &ToolCallRequest,
    violation: SandboxViolation,
    approval_id: Option<String>,
) -> (PipelineOutcome, AuditRecord) {
    metrics::record_sandbox_rejection(violation.kind());
    let mut record =
        AuditRecord::for_request(request, AuditOutcome::SandboxRejected, violation.to_string());
    record.approval_id = approval_id;
    (PipelineOutcome::SandboxRejected { violation }, record)
}

fn denied_by_verdict(
    request: &ToolCallRequest,
    verdict: ApprovalVerdict,
) -> (PipelineOutcome, AuditRecord) {
    let approval_id = verdict.approval_id().map(str::to_string);
    let (audit_outcome, reason) = match verdict {
        ApprovalVerdict::Expired { .. } => {
            (AuditOutcome::Expired, ToolError::ApprovalExpired.to_string())
        }
        ApprovalVerdict::NotifyFailed { detail, .. } => (
            AuditOutcome::Denied,
            ToolError::TransportNotifyFailed(detail).to_string(),
        ),
        ApprovalVerdict::Denied { reason, .. } => (
            AuditOutcome::Denied,
            ToolError::ApprovalDenied { reason }.to_string(),
        ),
        ApprovalVerdict::Approved { .. } => (AuditOutcome::Denied, "unexpected approval".into()),
    };
    info!("Call {} not approved: {}", request.call_id, reason);

    let mut record = AuditRecord::for_request(request, audit_outcome, reason.clone());
    record.approval_id = approval_id;
    (PipelineOutcome::Denied { reason }, record)
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Writes its record from a background task if dropped while still armed.
struct PendingAudit {
    sink: Arc<dyn AuditSink>,
    record: Option<AuditRecord>,
}

impl PendingAudit {
    fn new(sink: Arc<dyn AuditSink>, record: AuditRecord) -> Self {
        Self {
            sink,
            record: Some(record),
        }
    }

    fn replace(&mut self, record: AuditRecord) {
        self.record = Some(record);
    }

    fn complete(&mut self) {
        self.record = None;
    }
}

impl Drop for PendingAudit {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        warn!(
            "Call {} abandoned mid-flight, auditing as {}",
            record.call_id,
            record.outcome.as_str()
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let sink = self.sink.clone();
                runtime.spawn(async move {
                    let call_id = record.call_id.clone();
                    if let Err(e) = sink.append(record).await {
                        error!("Failed to audit abandoned call {}: {}", call_id, e);
                    }
                });
            }
            Err(_) => error!(
                "No runtime to audit abandoned call {}",
                record.call_id
            ),
        }
    }
}
