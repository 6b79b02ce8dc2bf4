pub mod command_guard;
pub mod limits;
pub mod path_guard;

pub use command_guard::CommandGuard;
pub use limits::ExecutionLimits;
pub use path_guard::PathGuard;

use crate::error::SandboxViolation;
use crate::request::ToolCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Argument keys treated as filesystem paths.
pub const PATH_KEYS: &[&str] = &[
    "path",
    "directory",
    "file",
    "file_path",
    "target",
    "source",
    "destination",
    "cwd",
];

/// Argument keys treated as shell commands.
pub const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub allowed_directories: Vec<String>,
    pub blocked_command_patterns: Vec<String>,
    /// Seconds.
    pub max_execution_time: u64,
    /// Bytes of serialized tool output.
    pub max_output_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_directories: vec!["~/Documents".to_string(), "~/Desktop".to_string()],
            blocked_command_patterns: vec![
                "rm -rf /".to_string(),
                "format".to_string(),
                "del /f /s /q C:\\".to_string(),
                "reg delete".to_string(),
                "rmdir /s /q C:\\".to_string(),
            ],
            max_execution_time: 30,
            max_output_size: 100_000,
        }
    }
}

/// Static pre-execution checks plus the limits enforced while a tool runs.
pub struct SandboxChecker {
    paths: PathGuard,
    commands: CommandGuard,
    limits: ExecutionLimits,
}

impl SandboxChecker {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            paths: PathGuard::new(&config.allowed_directories),
            commands: CommandGuard::new(&config.blocked_command_patterns),
            limits: ExecutionLimits::new(
                Duration::from_secs(config.max_execution_time),
                config.max_output_size,
            ),
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn path_guard(&self) -> &PathGuard {
        &self.paths
    }

    /// Check every path- and command-like argument of a call.
    ///
    /// Non-object params carry no named arguments and pass.
    pub fn check(&self, request: &ToolCallRequest) -> Result<(), SandboxViolation> {
        self.check_params(&request.params)
    }

    pub fn check_params(&self, params: &Value) -> Result<(), SandboxViolation> {
        let Some(args) = params.as_object() else {
            return Ok(());
        };

        for key in PATH_KEYS {
            match args.get(*key) {
                Some(Value::String(path)) => {
                    self.paths.validate(path)?;
                }
                Some(Value::Array(items)) => {
                    for path in items.iter().filter_map(Value::as_str) {
                        self.paths.validate(path)?;
                    }
                }
                _ => {}
            }
        }

        for key in COMMAND_KEYS {
            match args.get(*key) {
                Some(Value::String(command)) => self.commands.validate(command)?,
                Some(Value::Array(parts)) => {
                    let joined = parts
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.commands.validate(&joined)?;
                }
                _ => {}
            }
        }

        Ok(())
    }
}
