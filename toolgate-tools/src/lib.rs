pub mod error;
pub mod execution_context;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod sandbox;
pub mod tools;
pub mod traits;

pub use error::{SandboxViolation, ToolError};
pub use execution_context::ExecutionContext;
pub use outcome::{AuditOutcome, AuditRecord, PipelineOutcome};
pub use pipeline::ToolExecutionPipeline;
pub use registry::ToolRegistryImpl;
pub use request::ToolCallRequest;
pub use sandbox::{ExecutionLimits, SandboxChecker, SandboxConfig};
pub use tools::{Tool, ToolResult};
pub use traits::{ApprovalGate, ApprovalVerdict, AuditSink, ToolExecutor};
