#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use toolgate_infra::audit::{AuditLog, AuditLogError, AuditQuery, FactorStatus, GENESIS_HASH};
use toolgate_policy::RiskTier;
use toolgate_tools::{AuditOutcome, AuditRecord, ToolCallRequest};

fn record(session: &str, tool: &str, outcome: AuditOutcome) -> AuditRecord {
    let request = ToolCallRequest::with_risk(tool, json!({"n": 1}), RiskTier::Low, session, "user");
    AuditRecord::for_request(&request, outcome, "ok")
}

fn dated(tool: &str, risk: RiskTier, outcome: AuditOutcome, day: NaiveDate) -> AuditRecord {
    let request = ToolCallRequest::with_risk(tool, json!({}), risk, "s", "user");
    let mut record = AuditRecord::for_request(&request, outcome, "ok");
    record.timestamp = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
    record
}

fn populated(log: &AuditLog, count: usize) {
    for i in 0..count {
        log.append_record(&record(&format!("session_{}", i), "file_read", AuditOutcome::Executed))
            .unwrap();
    }
}

#[test]
fn test_valid_chain_verification() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    populated(&log, 5);

    let report = log.verify().unwrap();
    assert!(report.is_intact());
    assert_eq!(report.entries, 5);
    assert_eq!(report.first_divergence, None);
    assert_eq!(report.last_hash, log.last_hash());
    assert_eq!(log.next_seq(), 5);
}

#[test]
fn test_first_entry_chains_from_genesis() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    let entry = log
        .append_record(&record("s", "file_read", AuditOutcome::Executed))
        .unwrap();
    assert_eq!(entry.seq, 0);

    let line = std::fs::read_to_string(&log_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["prev_hash"], GENESIS_HASH);
    assert_eq!(value["seq"], 0);
    assert_eq!(value["outcome"], "executed");
    assert_eq!(value["risk"], "low");
}

#[test]
fn test_tampered_entry_detection() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    {
        let log = AuditLog::open(&log_path).unwrap();
        populated(&log, 3);
    }

    let content = std::fs::read_to_string(&log_path).unwrap();
    std::fs::write(&log_path, content.replace("session_1", "session_X")).unwrap();

    let result = AuditLog::open(&log_path);
    assert!(matches!(
        result,
        Err(AuditLogError::IntegrityViolation { seq: 1, .. })
    ));
}

#[test]
fn test_verify_reports_divergence_from_tampered_entry_on() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    populated(&log, 4);

    let content = std::fs::read_to_string(&log_path).unwrap();
    std::fs::write(&log_path, content.replace("session_2", "session_X")).unwrap();

    let report = log.verify().unwrap();
    assert!(!report.is_intact());
    assert_eq!(report.first_divergence, Some(2));
    let bad: Vec<u64> = report.invalid.iter().filter_map(|e| e.seq).collect();
    assert_eq!(bad, vec![2, 3]);
}

#[test]
fn test_deleted_entry_detection() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    populated(&log, 3);

    let content = std::fs::read_to_string(&log_path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, line)| line)
        .collect();
    std::fs::write(&log_path, kept.join("\n") + "\n").unwrap();

    let report = log.verify().unwrap();
    assert!(!report.is_intact());
    assert_eq!(report.entries, 2);
}

#[test]
fn test_reopen_continues_chain() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let head = {
        let log = AuditLog::open(&log_path).unwrap();
        populated(&log, 2);
        log.last_hash()
    };

    let log = AuditLog::open(&log_path).unwrap();
    assert_eq!(log.last_hash(), head);
    let entry = log
        .append_record(&record("later", "file_read", AuditOutcome::Denied))
        .unwrap();
    assert_eq!(entry.seq, 2);
    assert!(log.verify().unwrap().is_intact());
}

#[test]
fn test_params_redacted_before_persisting() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();

    let request = ToolCallRequest::with_risk(
        "web_browse",
        json!({"url": "https://example.com", "api_key": "super-secret-value"}),
        RiskTier::Medium,
        "s1",
        "u1",
    );
    let entry = log
        .append_record(&AuditRecord::for_request(&request, AuditOutcome::Executed, "ok"))
        .unwrap();

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(!content.contains("super-secret-value"));
    assert_eq!(entry.params["api_key"], "***");
    assert_eq!(entry.params["url"], "https://example.com");

    let digest = format!(
        "{:x}",
        Sha256::digest(serde_json::to_string(&entry.params).unwrap().as_bytes())
    );
    assert_eq!(entry.params_digest, digest);
}

#[test]
fn test_detail_truncated() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    let request = ToolCallRequest::with_risk("file_read", json!({}), RiskTier::Low, "s", "u");
    let entry = log
        .append_record(&AuditRecord::for_request(
            &request,
            AuditOutcome::Executed,
            "x".repeat(2000),
        ))
        .unwrap();
    assert_eq!(entry.detail.chars().count(), 500);
}

#[test]
fn test_query_filters_newest_first() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    let calls = [
        ("a", "file_read"),
        ("b", "file_write"),
        ("a", "file_write"),
        ("a", "file_read"),
    ];
    for (session, tool) in calls {
        log.append_record(&record(session, tool, AuditOutcome::Executed))
            .unwrap();
    }

    let all_a = log
        .query(&AuditQuery {
            session: Some("a".into()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(all_a.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 2, 0]);

    let writes = log
        .query(&AuditQuery {
            tool: Some("file_write".into()),
            limit: Some(1),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].seq, 2);
}

#[test]
fn test_query_time_window_and_stats() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();

    let day_one = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let day_two = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
    let rows = [
        (day_one, "file_read", AuditOutcome::Executed),
        (day_one, "file_read", AuditOutcome::Executed),
        (day_one, "shell_execute", AuditOutcome::Disabled),
        (day_two, "file_write", AuditOutcome::Expired),
    ];
    for (ts, tool, outcome) in rows {
        let mut entry = record("s", tool, outcome);
        entry.timestamp = ts;
        log.append_record(&entry).unwrap();
    }

    let second_day = log
        .query(&AuditQuery {
            since: Some(day_two - chrono::Duration::hours(1)),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(second_day.len(), 1);
    assert_eq!(second_day[0].tool, "file_write");

    let stats = log.stats(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_outcome["executed"], 2);
    assert_eq!(stats.by_outcome["disabled"], 1);
    assert_eq!(stats.by_risk["low"], 3);
    assert_eq!(stats.top_tools[0], ("file_read".to_string(), 2));
}

#[test]
fn test_serialized_output_detail_redacted() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    let request = ToolCallRequest::with_risk("db_lookup", json!({}), RiskTier::Low, "s", "u");

    let entry = log
        .append_record(&AuditRecord::for_request(
            &request,
            AuditOutcome::Executed,
            r#"{"password":"hunter2","rows":3}"#,
        ))
        .unwrap();

    assert!(!std::fs::read_to_string(&log_path).unwrap().contains("hunter2"));
    let detail: serde_json::Value = serde_json::from_str(&entry.detail).unwrap();
    assert_eq!(detail["password"], "***");
    assert_eq!(detail["rows"], 3);
}

#[test]
fn test_blocked_counts_by_day() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

    let rows = [
        (day(1), AuditOutcome::Executed),
        (day(3), AuditOutcome::Executed),
        (day(3), AuditOutcome::Failed),
        (day(3), AuditOutcome::Denied),
        (day(3), AuditOutcome::Cancelled),
        (day(4), AuditOutcome::SandboxRejected),
        (day(4), AuditOutcome::Expired),
        (day(5), AuditOutcome::Disabled),
    ];
    for (date, outcome) in rows {
        log.append_record(&dated("file_read", RiskTier::Low, outcome, date))
            .unwrap();
    }

    let counts = log.blocked_counts(3, day(4)).unwrap();
    assert_eq!(counts.days, 3);
    let dates: Vec<_> = counts.daily.iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![day(2), day(3), day(4)]);
    assert_eq!((counts.daily[0].approved, counts.daily[0].blocked), (0, 0));
    assert_eq!((counts.daily[1].approved, counts.daily[1].blocked), (2, 1));
    assert_eq!((counts.daily[2].approved, counts.daily[2].blocked), (0, 2));
    assert_eq!(counts.total_approved, 2);
    assert_eq!(counts.total_blocked, 3);

    assert!(log.blocked_counts(0, day(4)).unwrap().daily.is_empty());
}

#[test]
fn test_security_score_clean_log() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    for _ in 0..4 {
        log.append_record(&dated("file_read", RiskTier::Low, AuditOutcome::Executed, today))
            .unwrap();
    }
    log.append_record(&dated("shell_execute", RiskTier::High, AuditOutcome::Denied, today))
        .unwrap();

    let score = log.security_score(today).unwrap();
    assert_eq!(score.score, 100);
    assert_eq!(score.grade, 'A');
    assert_eq!(score.date, today);
    assert_eq!(score.factors.len(), 3);
    assert!(score.factors.iter().all(|f| f.status == FactorStatus::Ok));
    assert!(score.recommendations.is_empty());
}

#[test]
fn test_security_score_penalizes_denials_and_high_risk() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    for _ in 0..6 {
        log.append_record(&dated("shell_execute", RiskTier::High, AuditOutcome::Denied, today))
            .unwrap();
        log.append_record(&dated("format_disk", RiskTier::Critical, AuditOutcome::Executed, today))
            .unwrap();
    }

    let score = log.security_score(today).unwrap();
    assert_eq!(score.score, 80);
    assert_eq!(score.grade, 'B');
    let warned: Vec<_> = score
        .factors
        .iter()
        .filter(|f| f.status == FactorStatus::Warning)
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(warned, vec!["deny_ratio", "high_risk_volume"]);
    assert_eq!(score.recommendations.len(), 2);

    // A week later the old activity is out of both windows.
    let later = today + chrono::Duration::days(7);
    assert_eq!(log.security_score(later).unwrap().score, 100);
}

#[test]
fn test_security_score_of_tampered_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    {
        let log = AuditLog::open(&log_path).unwrap();
        populated(&log, 3);
    }
    let content = std::fs::read_to_string(&log_path).unwrap();
    std::fs::write(&log_path, content.replace("session_1", "session_X")).unwrap();

    let today = Utc::now().date_naive();
    let score = AuditLog::security_score_path(&log_path, today).unwrap();
    assert_eq!(score.score, 70);
    assert_eq!(score.grade, 'B');
    assert_eq!(score.factors[0].name, "audit_integrity");
    assert_eq!(score.factors[0].status, FactorStatus::Warning);
    assert!(score.recommendations[0].contains("integrity"));
}

#[test]
fn test_rotation_keeps_chain_verifiable() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    populated(&log, 3);
    let head = log.last_hash();

    let segment = log.rotate().unwrap().unwrap();
    assert!(segment.exists());
    assert_eq!(std::fs::metadata(&log_path).unwrap().len(), 0);
    assert_eq!(log.rotate().unwrap(), None);

    populated(&log, 2);
    let first_line = std::fs::read_to_string(&log_path).unwrap();
    let first: serde_json::Value =
        serde_json::from_str(first_line.lines().next().unwrap()).unwrap();
    assert_eq!(first["prev_hash"], head.as_str());
    assert_eq!(first["seq"], 3);

    let report = log.verify().unwrap();
    assert!(report.is_intact());
    assert_eq!(report.segments, 2);
    assert_eq!(report.entries, 5);
    assert_eq!(log.query(&AuditQuery::default()).unwrap().len(), 5);

    drop(log);
    let reopened = AuditLog::open(&log_path).unwrap();
    assert_eq!(reopened.next_seq(), 5);
}

#[test]
fn test_prune_anchors_surviving_chain() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    let log = AuditLog::open(&log_path).unwrap();
    populated(&log, 2);
    log.rotate().unwrap();
    populated(&log, 2);
    log.rotate().unwrap();
    populated(&log, 1);

    let removed = log.prune(0).unwrap();
    assert_eq!(removed.len(), 2);

    let report = log.verify().unwrap();
    assert!(report.is_intact());
    assert_eq!(report.entries, 1);

    drop(log);
    let reopened = AuditLog::open(&log_path).unwrap();
    assert_eq!(reopened.next_seq(), 5);
}

#[test]
fn test_prune_keeps_recent_segments() {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
    populated(&log, 2);
    log.rotate().unwrap();
    assert!(log.prune(90).unwrap().is_empty());
    assert_eq!(log.verify().unwrap().segments, 2);
}

#[test]
fn test_torn_tail_discarded_on_open() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("audit.log");
    {
        let log = AuditLog::open(&log_path).unwrap();
        populated(&log, 2);
    }

    let mut content = std::fs::read_to_string(&log_path).unwrap();
    content.push_str("{\"seq\":2,\"ts\":\"2024-");
    std::fs::write(&log_path, content).unwrap();

    let log = AuditLog::open(&log_path).unwrap();
    assert_eq!(log.next_seq(), 2);
    populated(&log, 1);
    assert!(log.verify().unwrap().is_intact());
}

#[tokio::test]
async fn test_concurrent_appends_form_one_chain() {
    let dir = tempdir().unwrap();
    let log = std::sync::Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let log = log.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            for j in 0..10 {
                let session = format!("s{}-{}", i, j);
                log.append_record(&record(&session, "file_read", AuditOutcome::Executed))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = log.verify().unwrap();
    assert!(report.is_intact());
    assert_eq!(report.entries, 80);
}
