use crate::error::SandboxViolation;
use regex::Regex;
use tracing::{debug, error};

/// Destructive shapes matched against the lowercased command.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"\brm\s+(-[a-z-]+\s+)*(/|~|\*|/\*)(\s|$)",
    r"\bformat\s+[a-z]:",
    r"\bdel\s+(/[a-z]\s+)*/[sfq]\b",
    r"\brmdir\s+/s\s+/q\b",
    r"\bmkfs(\.[a-z0-9]+)?\b",
    r"\bdd\s+.*\bof=/dev/",
    r">\s*/dev/(sd[a-z]|nvme\d|hd[a-z])",
    r"\bchmod\s+-r\s+777\s+/(\s|$)",
    r"\bchown\s+-r\s+\S+\s+/(\s|$)",
    r"\b(curl|wget)\b.*\|\s*(sudo\s+)?(ba|z)?sh\b",
    r"\breg\s+delete\b",
    r"\bnet\s+user\s+.*\s/add\b",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
];

const CHAINING_TOKENS: &[&str] = &["&&", "||", ";", "|", "`", "$("];

/// Deny-list screening for shell command arguments.
pub struct CommandGuard {
    blocked: Vec<String>,
    dangerous: Vec<Regex>,
}

impl CommandGuard {
    pub fn new<S: AsRef<str>>(blocked_patterns: &[S]) -> Self {
        let blocked = blocked_patterns
            .iter()
            .map(|pattern| pattern.as_ref().trim().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();

        let dangerous = DANGEROUS_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    error!("Invalid dangerous-command pattern {}: {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { blocked, dangerous }
    }

    pub fn validate(&self, command: &str) -> Result<(), SandboxViolation> {
        if command.contains('\0') {
            return Err(SandboxViolation::command("command contains a NUL byte"));
        }

        let lowered = command.to_lowercase();

        if let Some(pattern) = self.blocked.iter().find(|p| lowered.contains(p.as_str())) {
            return Err(SandboxViolation::command(format!(
                "matches blocked pattern '{}'",
                pattern
            )));
        }

        if let Some(regex) = self.dangerous.iter().find(|r| r.is_match(&lowered)) {
            return Err(SandboxViolation::command(format!(
                "matches dangerous pattern '{}'",
                regex.as_str()
            )));
        }

        if CHAINING_TOKENS.iter().any(|token| command.contains(token)) {
            debug!("Command uses shell chaining: {}", command);
        }

        Ok(())
    }
}
