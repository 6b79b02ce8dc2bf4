use crate::error::SandboxViolation;
use serde_json::Value;
use std::time::Duration;

/// Wall-clock and output bounds applied to a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_output_size: usize,
}

impl ExecutionLimits {
    pub fn new(timeout: Duration, max_output_size: usize) -> Self {
        Self {
            timeout,
            max_output_size,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn timeout_violation(&self) -> SandboxViolation {
        SandboxViolation::Timeout {
            limit_ms: self.timeout_ms(),
        }
    }

    /// Size of the serialized output, or a violation when it is over the limit.
    pub fn check_output(&self, output: Option<&Value>) -> Result<usize, SandboxViolation> {
        let actual = match output {
            Some(value) => serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0),
            None => 0,
        };
        if actual > self.max_output_size {
            return Err(SandboxViolation::OutputSize {
                limit: self.max_output_size,
                actual,
            });
        }
        Ok(actual)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 100_000)
    }
}
