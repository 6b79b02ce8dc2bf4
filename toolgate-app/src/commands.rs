use crate::cli::{Command, Invocation, USAGE};
use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use toolgate_infra::{AuditLog, GateConfig};
use tracing::{info, warn};

/// Exit status when the audit chain does not verify.
pub const EXIT_CHAIN_BROKEN: u8 = 2;

/// Execute one command, writing its report to `out`. Returns the exit status.
pub fn run(invocation: &Invocation, out: &mut dyn Write) -> Result<u8> {
    if invocation.command == Command::Help {
        writeln!(out, "{}", USAGE)?;
        return Ok(0);
    }

    let config = match &invocation.config {
        Some(path) => GateConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => GateConfig::from_env().context("invalid configuration from environment")?,
    };

    match &invocation.command {
        Command::Help => Ok(0),
        Command::ConfigCheck => {
            writeln!(out, "{}", config.to_yaml()?)?;
            writeln!(out, "configuration ok")?;
            Ok(0)
        }
        Command::AuditVerify => {
            let report = AuditLog::verify_path(&config.audit.path).with_context(|| {
                format!("failed to read audit log {}", config.audit.path.display())
            })?;

            writeln!(
                out,
                "entries: {}  segments: {}  head: {}",
                report.entries, report.segments, report.last_hash
            )?;
            if report.is_intact() {
                writeln!(out, "chain intact")?;
                return Ok(0);
            }

            for bad in &report.invalid {
                let seq = bad.seq.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
                writeln!(out, "  {} line {} (seq {}): {}", bad.segment, bad.line, seq, bad.reason)?;
            }
            if let Some(seq) = report.first_divergence {
                writeln!(out, "chain diverges at entry {}", seq)?;
            }
            warn!("Audit chain verification failed: {} invalid entries", report.invalid.len());
            Ok(EXIT_CHAIN_BROKEN)
        }
        Command::AuditQuery(query) => {
            let log = open_log(&config)?;
            for entry in log.query(query)? {
                writeln!(out, "{}", serde_json::to_string(&entry)?)?;
            }
            Ok(0)
        }
        Command::AuditStats { date } => {
            let log = open_log(&config)?;
            let stats = log.stats(date.unwrap_or_else(|| Utc::now().date_naive()))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            Ok(0)
        }
        Command::AuditBlocked { days } => {
            let log = open_log(&config)?;
            let counts = log.blocked_counts(*days, Utc::now().date_naive())?;
            writeln!(out, "{}", serde_json::to_string_pretty(&counts)?)?;
            Ok(0)
        }
        Command::AuditScore => {
            let score = AuditLog::security_score_path(&config.audit.path, Utc::now().date_naive())
                .with_context(|| {
                    format!("failed to read audit log {}", config.audit.path.display())
                })?;
            writeln!(out, "{}", serde_json::to_string_pretty(&score)?)?;
            info!("Security score {} ({})", score.score, score.grade);
            Ok(0)
        }
        Command::AuditRotate => {
            let log = open_log(&config)?;
            match log.rotate()? {
                Some(segment) => writeln!(out, "rotated to {}", segment.display())?,
                None => writeln!(out, "active segment is empty, nothing to rotate")?,
            }
            Ok(0)
        }
        Command::AuditPrune => {
            let log = open_log(&config)?;
            let removed = log.prune(config.audit.retention_days)?;
            for segment in &removed {
                writeln!(out, "removed {}", segment.display())?;
            }
            info!("Pruned {} audit segments", removed.len());
            writeln!(out, "{} segments pruned", removed.len())?;
            Ok(0)
        }
    }
}

fn open_log(config: &GateConfig) -> Result<AuditLog> {
    AuditLog::with_rotation(&config.audit.path, config.audit.max_file_size_mb)
        .with_context(|| format!("failed to open audit log {}", config.audit.path.display()))
}
