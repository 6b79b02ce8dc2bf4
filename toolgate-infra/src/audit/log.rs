use super::record::{
    AuditEntry, AuditQuery, AuditStats, BlockedCounts, ChainedEntry, DailyCounts, FactorStatus,
    InvalidEntry, ScoreFactor, SecurityScore, VerifyReport,
};
use super::redact::Redactor;
use chrono::{Duration as DateSpan, NaiveDate, SecondsFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use toolgate_tools::{AuditOutcome, AuditRecord};
use tracing::{debug, error, info, warn};

pub const GENESIS_HASH: &str = "genesis";
const DETAIL_LIMIT: usize = 500;
const TOP_TOOLS: usize = 10;

const SCORE_WINDOW_DAYS: u32 = 7;
const DENY_RATIO_LIMIT: f64 = 0.3;
const HIGH_RISK_DAILY_LIMIT: u64 = 10;
const INTEGRITY_PENALTY: u8 = 30;
const DENY_RATIO_PENALTY: u8 = 10;
const HIGH_RISK_PENALTY: u8 = 10;

#[derive(Error, Debug)]
pub enum AuditLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chain integrity violation at entry {seq}: {detail}")]
    IntegrityViolation { seq: u64, detail: String },
}

/// Where the surviving chain starts once older segments were pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainAnchor {
    prev_hash: String,
    next_seq: u64,
}

impl Default for ChainAnchor {
    fn default() -> Self {
        Self {
            prev_hash: GENESIS_HASH.to_string(),
            next_seq: 0,
        }
    }
}

struct ChainState {
    file: File,
    last_hash: String,
    next_seq: u64,
    bytes: u64,
}

/// Append-only, hash-chained JSON-lines audit trail.
///
/// Every entry stores the hash of its predecessor and its own hash over
/// `prev_hash ‖ entry JSON`. One lock owns the file handle, the chain head
/// and the sequence counter, so the file order is the chain order.
///
/// Rotated segments sit next to the active file as `<name>.<seq>`, where
/// `<seq>` is the first sequence number of the following segment.
pub struct AuditLog {
    path: PathBuf,
    redactor: Redactor,
    max_segment_bytes: Option<u64>,
    state: Mutex<ChainState>,
}

impl AuditLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuditLogError> {
        Self::open_with_limit(path, None)
    }

    /// Open with automatic rotation once the active file reaches `max_file_size_mb`.
    pub fn with_rotation<P: AsRef<Path>>(
        path: P,
        max_file_size_mb: u64,
    ) -> Result<Self, AuditLogError> {
        Self::open_with_limit(path, Some(max_file_size_mb.saturating_mul(1024 * 1024)))
    }

    fn open_with_limit<P: AsRef<Path>>(
        path: P,
        max_segment_bytes: Option<u64>,
    ) -> Result<Self, AuditLogError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(log_dir(&path))?;

        repair_torn_tail(&path)?;

        // Refuse to extend a broken chain
        let (report, next_seq) = walk_chain(&path)?;
        if let Some(bad) = report.invalid.first() {
            return Err(AuditLogError::IntegrityViolation {
                seq: report.first_divergence.unwrap_or(next_seq),
                detail: format!("{} line {}: {}", bad.segment, bad.line, bad.reason),
            });
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes = file.metadata()?.len();

        info!(
            "Audit log opened: path={} entries={} segments={}",
            path.display(),
            report.entries,
            report.segments
        );

        Ok(Self {
            path,
            redactor: Redactor::new(),
            max_segment_bytes,
            state: Mutex::new(ChainState {
                file,
                last_hash: report.last_hash,
                next_seq,
                bytes,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> String {
        self.state.lock().last_hash.clone()
    }

    pub fn next_seq(&self) -> u64 {
        self.state.lock().next_seq
    }

    /// Redact, chain and durably write one record.
    pub fn append_record(&self, record: &AuditRecord) -> Result<AuditEntry, AuditLogError> {
        let params = self.redactor.redact(&record.params);
        let params_json = serde_json::to_string(&params)?;
        let params_digest = sha256_hex(&[params_json.as_str()]);
        let detail = truncate_chars(&self.redactor.redact_detail(&record.detail), DETAIL_LIMIT);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = AuditEntry {
            seq: state.next_seq,
            ts: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            call_id: record.call_id.clone(),
            session_id: record.session_id.clone(),
            requester_id: record.requester_id.clone(),
            tool: record.tool.clone(),
            risk: record.risk,
            params,
            params_digest,
            outcome: record.outcome,
            detail,
            approval_id: record.approval_id.clone(),
            approver: record.approver.clone(),
            duration_ms: record.duration_ms,
        };
        let hash = chain_hash(&state.last_hash, &entry)?;
        let chained = ChainedEntry {
            entry,
            prev_hash: state.last_hash.clone(),
            hash,
        };
        let line = serde_json::to_string(&chained)?;

        if let Err(e) = write_line(&mut state.file, &line) {
            // Drop any partial line so the file stays parseable.
            if let Err(trunc) = state.file.set_len(state.bytes) {
                error!("Failed to roll back partial audit write: {}", trunc);
            }
            return Err(e.into());
        }

        state.bytes += line.len() as u64 + 1;
        state.last_hash = chained.hash;
        state.next_seq += 1;

        if self.max_segment_bytes.is_some_and(|max| state.bytes >= max) {
            if let Err(e) = self.rotate_locked(state) {
                warn!("Audit rotation failed, continuing in current segment: {}", e);
            }
        }

        Ok(chained.entry)
    }

    /// Re-walk every segment, carrying the recomputed hash forward.
    pub fn verify(&self) -> Result<VerifyReport, AuditLogError> {
        let _writer = self.state.lock();
        let (report, _) = walk_chain(&self.path)?;
        if let Some(seq) = report.first_divergence {
            warn!(
                "Audit chain diverges at entry {} ({} invalid entries)",
                seq,
                report.invalid.len()
            );
        }
        Ok(report)
    }

    /// Walk a log on disk without opening it for writing. Works on broken chains.
    pub fn verify_path<P: AsRef<Path>>(path: P) -> Result<VerifyReport, AuditLogError> {
        let (report, _) = walk_chain(path.as_ref())?;
        Ok(report)
    }

    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditLogError> {
        let mut entries: Vec<AuditEntry> = read_entries(&self.path)?
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    pub fn stats(&self, date: NaiveDate) -> Result<AuditStats, AuditLogError> {
        stats_at(&self.path, date)
    }

    /// Approved versus blocked calls for the `days` UTC dates ending at `until`.
    pub fn blocked_counts(
        &self,
        days: u32,
        until: NaiveDate,
    ) -> Result<BlockedCounts, AuditLogError> {
        blocked_counts_at(&self.path, days, until)
    }

    /// Grade the trail: chain integrity, the weekly deny ratio and today's
    /// high-risk volume each cost points when they look wrong.
    pub fn security_score(&self, today: NaiveDate) -> Result<SecurityScore, AuditLogError> {
        let _writer = self.state.lock();
        security_score_at(&self.path, today)
    }

    /// Same as [`AuditLog::security_score`] for a log that may not open.
    pub fn security_score_path<P: AsRef<Path>>(
        path: P,
        today: NaiveDate,
    ) -> Result<SecurityScore, AuditLogError> {
        security_score_at(path.as_ref(), today)
    }

    /// Close the active segment and start a new one chained to it.
    ///
    /// Returns the rotated segment's path, or `None` when the active file is empty.
    pub fn rotate(&self) -> Result<Option<PathBuf>, AuditLogError> {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    fn rotate_locked(&self, state: &mut ChainState) -> Result<Option<PathBuf>, AuditLogError> {
        if state.bytes == 0 {
            return Ok(None);
        }

        let target = segment_path(&self.path, state.next_seq);
        state.file.sync_all()?;
        fs::rename(&self.path, &target)?;
        state.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        state.bytes = 0;

        info!(
            "Audit log rotated: segment={} next_seq={}",
            target.display(),
            state.next_seq
        );
        Ok(Some(target))
    }

    /// Delete rotated segments last modified more than `retention_days` ago.
    ///
    /// Only the oldest contiguous run is removed, and the chain head of the
    /// last removed segment is kept as the anchor for verification.
    pub fn prune(&self, retention_days: u64) -> Result<Vec<PathBuf>, AuditLogError> {
        let _writer = self.state.lock();
        let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = Vec::new();
        for segment in rotated_segments(&self.path)? {
            let modified = fs::metadata(&segment)?.modified()?;
            if modified > cutoff {
                break;
            }

            if let Some(anchor) = segment_tail(&segment)? {
                write_anchor(&self.path, &anchor)?;
            }
            fs::remove_file(&segment)?;
            info!("Pruned audit segment {}", segment.display());
            removed.push(segment);
        }
        Ok(removed)
    }
}

fn log_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "audit.log".to_string())
}

fn segment_path(path: &Path, next_seq: u64) -> PathBuf {
    log_dir(path).join(format!("{}.{:012}", file_name(path), next_seq))
}

fn anchor_path(path: &Path) -> PathBuf {
    log_dir(path).join(format!("{}.anchor", file_name(path)))
}

/// Rotated segments, oldest first.
fn rotated_segments(path: &Path) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{}.", file_name(path));
    let mut segments: Vec<(u64, PathBuf)> = Vec::new();

    for dir_entry in fs::read_dir(log_dir(path))? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name().to_string_lossy().to_string();
        if let Some(seq) = name
            .strip_prefix(&prefix)
            .and_then(|suffix| suffix.parse::<u64>().ok())
        {
            segments.push((seq, dir_entry.path()));
        }
    }

    segments.sort_by_key(|(seq, _)| *seq);
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}

/// Every segment in chain order, the active file last.
fn all_segments(path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut segments = rotated_segments(path)?;
    if path.exists() {
        segments.push(path.to_path_buf());
    }
    Ok(segments)
}

fn read_anchor(path: &Path) -> Result<ChainAnchor, AuditLogError> {
    let anchor = anchor_path(path);
    if !anchor.exists() {
        return Ok(ChainAnchor::default());
    }
    Ok(serde_json::from_str(&fs::read_to_string(anchor)?)?)
}

fn write_anchor(path: &Path, anchor: &ChainAnchor) -> Result<(), AuditLogError> {
    let target = anchor_path(path);
    let tmp = target.with_extension("anchor.tmp");
    fs::write(&tmp, serde_json::to_string(anchor)?)?;
    fs::rename(&tmp, &target)?;
    Ok(())
}

/// Chain head after the last entry of a segment.
fn segment_tail(segment: &Path) -> Result<Option<ChainAnchor>, AuditLogError> {
    let reader = BufReader::new(File::open(segment)?);
    let mut tail = None;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chained: ChainedEntry = serde_json::from_str(&line)?;
        tail = Some(ChainAnchor {
            prev_hash: chained.hash,
            next_seq: chained.entry.seq + 1,
        });
    }
    Ok(tail)
}

fn walk_chain(path: &Path) -> Result<(VerifyReport, u64), AuditLogError> {
    let anchor = read_anchor(path)?;
    let segments = all_segments(path)?;

    let mut carried = anchor.prev_hash;
    let mut expected_seq = anchor.next_seq;
    let mut entries = 0u64;
    let mut invalid = Vec::new();
    let mut first_divergence = None;

    for segment in &segments {
        let segment_name = file_name(segment);
        let reader = BufReader::new(File::open(segment)?);

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries += 1;

            let chained: ChainedEntry = match serde_json::from_str(&line) {
                Ok(chained) => chained,
                Err(e) => {
                    invalid.push(InvalidEntry {
                        segment: segment_name.clone(),
                        line: idx + 1,
                        seq: None,
                        reason: format!("unparseable entry: {}", e),
                    });
                    first_divergence.get_or_insert(expected_seq);
                    carried = sha256_hex(&[carried.as_str(), line.as_str()]);
                    expected_seq += 1;
                    continue;
                }
            };

            let recomputed = chain_hash(&carried, &chained.entry)?;
            let mut reasons = Vec::new();
            if chained.entry.seq != expected_seq {
                reasons.push(format!(
                    "expected seq {}, found {}",
                    expected_seq, chained.entry.seq
                ));
            }
            if chained.prev_hash != carried {
                reasons.push("prev_hash does not match the preceding entry".to_string());
            }
            if chained.hash != recomputed {
                reasons.push("hash does not match entry contents".to_string());
            }

            if !reasons.is_empty() {
                debug!("Audit entry {} failed verification", chained.entry.seq);
                first_divergence.get_or_insert(chained.entry.seq);
                invalid.push(InvalidEntry {
                    segment: segment_name.clone(),
                    line: idx + 1,
                    seq: Some(chained.entry.seq),
                    reason: reasons.join("; "),
                });
            }

            carried = recomputed;
            expected_seq = chained.entry.seq + 1;
        }
    }

    let report = VerifyReport {
        entries,
        segments: segments.len(),
        invalid,
        first_divergence,
        last_hash: carried,
    };
    Ok((report, expected_seq))
}

fn stats_at(path: &Path, date: NaiveDate) -> Result<AuditStats, AuditLogError> {
    let mut stats = AuditStats {
        date,
        total: 0,
        by_outcome: BTreeMap::new(),
        by_risk: BTreeMap::new(),
        top_tools: Vec::new(),
    };
    let mut tools: HashMap<String, u64> = HashMap::new();

    for entry in read_entries(path)? {
        if entry.timestamp().map(|ts| ts.date_naive()) != Some(date) {
            continue;
        }
        stats.total += 1;
        *stats
            .by_outcome
            .entry(entry.outcome.as_str().to_string())
            .or_default() += 1;
        *stats.by_risk.entry(entry.risk.to_string()).or_default() += 1;
        *tools.entry(entry.tool).or_default() += 1;
    }

    let mut top: Vec<(String, u64)> = tools.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_TOOLS);
    stats.top_tools = top;
    Ok(stats)
}

/// Outcomes where the gate stopped the call before the tool ran.
fn is_blocked(outcome: AuditOutcome) -> bool {
    matches!(
        outcome,
        AuditOutcome::Disabled
            | AuditOutcome::SandboxRejected
            | AuditOutcome::Denied
            | AuditOutcome::Expired
    )
}

fn blocked_counts_at(
    path: &Path,
    days: u32,
    until: NaiveDate,
) -> Result<BlockedCounts, AuditLogError> {
    let mut daily: BTreeMap<NaiveDate, DailyCounts> = (0..days)
        .map(|offset| until - DateSpan::days(i64::from(offset)))
        .map(|date| {
            let counts = DailyCounts {
                date,
                approved: 0,
                blocked: 0,
            };
            (date, counts)
        })
        .collect();

    for entry in read_entries(path)? {
        let Some(date) = entry.timestamp().map(|ts| ts.date_naive()) else {
            continue;
        };
        let Some(counts) = daily.get_mut(&date) else {
            continue;
        };
        if entry.outcome.ran() {
            counts.approved += 1;
        } else if is_blocked(entry.outcome) {
            counts.blocked += 1;
        }
    }

    let daily: Vec<DailyCounts> = daily.into_values().collect();
    Ok(BlockedCounts {
        days,
        total_approved: daily.iter().map(|d| d.approved).sum(),
        total_blocked: daily.iter().map(|d| d.blocked).sum(),
        daily,
    })
}

fn security_score_at(path: &Path, today: NaiveDate) -> Result<SecurityScore, AuditLogError> {
    let mut score: u8 = 100;
    let mut factors = Vec::new();
    let mut recommendations = Vec::new();

    let (report, _) = walk_chain(path)?;
    if report.is_intact() {
        factors.push(ScoreFactor {
            name: "audit_integrity".to_string(),
            status: FactorStatus::Ok,
            detail: format!("{} entries verified", report.entries),
        });
    } else {
        score = score.saturating_sub(INTEGRITY_PENALTY);
        factors.push(ScoreFactor {
            name: "audit_integrity".to_string(),
            status: FactorStatus::Warning,
            detail: format!("{} tampered or unreadable entries", report.invalid.len()),
        });
        recommendations
            .push("Audit log integrity compromised, investigate immediately".to_string());
    }

    let week = blocked_counts_at(path, SCORE_WINDOW_DAYS, today)?;
    let decided = week.total_approved + week.total_blocked;
    let deny_ratio = if decided == 0 {
        0.0
    } else {
        week.total_blocked as f64 / decided as f64
    };
    let deny_detail = format!(
        "{} of {} calls blocked in the last {} days",
        week.total_blocked, decided, SCORE_WINDOW_DAYS
    );
    if deny_ratio > DENY_RATIO_LIMIT {
        score = score.saturating_sub(DENY_RATIO_PENALTY);
        factors.push(ScoreFactor {
            name: "deny_ratio".to_string(),
            status: FactorStatus::Warning,
            detail: deny_detail,
        });
        recommendations.push("High denial rate, review blocked operations".to_string());
    } else {
        factors.push(ScoreFactor {
            name: "deny_ratio".to_string(),
            status: FactorStatus::Ok,
            detail: deny_detail,
        });
    }

    let day = stats_at(path, today)?;
    let high_risk: u64 = ["high", "critical"]
        .iter()
        .filter_map(|tier| day.by_risk.get(*tier))
        .sum();
    let high_risk_detail = format!("{} high or critical calls today", high_risk);
    if high_risk > HIGH_RISK_DAILY_LIMIT {
        score = score.saturating_sub(HIGH_RISK_PENALTY);
        factors.push(ScoreFactor {
            name: "high_risk_volume".to_string(),
            status: FactorStatus::Warning,
            detail: high_risk_detail,
        });
        recommendations.push("Unusual volume of high-risk operations today".to_string());
    } else {
        factors.push(ScoreFactor {
            name: "high_risk_volume".to_string(),
            status: FactorStatus::Ok,
            detail: high_risk_detail,
        });
    }

    Ok(SecurityScore {
        date: today,
        score,
        grade: grade_for(score),
        factors,
        recommendations,
    })
}

fn grade_for(score: u8) -> char {
    match score {
        90.. => 'A',
        70..=89 => 'B',
        50..=69 => 'C',
        _ => 'D',
    }
}

/// All parseable entries across segments; torn or garbled lines are skipped.
fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, AuditLogError> {
    let mut entries = Vec::new();
    for segment in all_segments(path)? {
        let reader = BufReader::new(File::open(&segment)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChainedEntry>(&line) {
                Ok(chained) => entries.push(chained.entry),
                Err(e) => debug!("Skipping unreadable audit line in {}: {}", segment.display(), e),
            }
        }
    }
    Ok(entries)
}

/// A crash between writing an entry and its newline leaves a torn tail.
fn repair_torn_tail(path: &Path) -> Result<(), AuditLogError> {
    if !path.exists() {
        return Ok(());
    }
    let bytes = fs::read(path)?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let tail = &bytes[keep..];

    if serde_json::from_slice::<ChainedEntry>(tail).is_ok() {
        warn!("Audit log missing final newline, restoring it");
        OpenOptions::new().append(true).open(path)?.write_all(b"\n")?;
    } else {
        warn!(
            "Discarding {} bytes of torn audit entry at end of {}",
            tail.len(),
            path.display()
        );
        OpenOptions::new().write(true).open(path)?.set_len(keep as u64)?;
    }
    Ok(())
}

fn write_line(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}

fn chain_hash(prev_hash: &str, entry: &AuditEntry) -> Result<String, serde_json::Error> {
    let entry_json = serde_json::to_string(entry)?;
    Ok(sha256_hex(&[prev_hash, entry_json.as_str()]))
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
