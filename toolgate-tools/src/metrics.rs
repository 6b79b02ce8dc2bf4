//! Metrics instrumentation for the gate.

use std::time::Instant;

pub fn record_pipeline_outcome(outcome: &'static str) {
    metrics::counter!("toolgate_pipeline_outcome", 1, "outcome" => outcome);
}

pub fn record_sandbox_rejection(kind: &'static str) {
    metrics::counter!("toolgate_sandbox_rejection", 1, "kind" => kind);
}

pub fn record_approval_resolution(status: &'static str) {
    metrics::counter!("toolgate_approval_resolution", 1, "status" => status);
}

pub fn record_approval_wait(duration_ms: f64) {
    metrics::histogram!("toolgate_approval_wait_ms", duration_ms);
}

pub fn record_tool_latency(duration_ms: f64) {
    metrics::histogram!("toolgate_tool_execution_ms", duration_ms);
}

/// RAII timer for automatic metric recording.
pub struct MetricTimer {
    start: Instant,
    record: fn(f64),
}

impl MetricTimer {
    pub fn new(record: fn(f64)) -> Self {
        Self {
            start: Instant::now(),
            record,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        (self.record)(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
