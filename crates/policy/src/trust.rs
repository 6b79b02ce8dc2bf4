use crate::clock::{Clock, SystemClock};
use crate::risk::RiskTier;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A temporary grant letting a session auto-allow calls up to `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTrustRecord {
    pub session_id: String,
    pub level: RiskTier,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionTrustRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Per-session trust levels with lazy expiry.
///
/// Records live in a sharded map: sessions hashing to different shards
/// never contend, and writes to one session are serialized by its shard.
/// Nothing sweeps expired records; a record past `expires_at` reads as
/// absent and the session falls back to [`RiskTier::Low`].
pub struct SessionTrustStore {
    records: DashMap<String, SessionTrustRecord>,
    clock: Arc<dyn Clock>,
}

impl SessionTrustStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Install or replace the trust record for `session_id`.
    pub fn elevate(&self, session_id: &str, level: RiskTier, ttl: Duration) -> SessionTrustRecord {
        let granted_at = self.clock.now();
        let expires_at = granted_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let record = SessionTrustRecord {
            session_id: session_id.to_string(),
            level,
            granted_at,
            expires_at,
        };
        self.records.insert(session_id.to_string(), record.clone());

        info!(
            "Session trust elevated: session={} level={} expires_at={}",
            session_id,
            level,
            expires_at.to_rfc3339()
        );
        record
    }

    pub fn current_level(&self, session_id: &str) -> RiskTier {
        self.record(session_id)
            .map(|record| record.level)
            .unwrap_or(RiskTier::Low)
    }

    /// The active record for a session, if one exists and has not expired.
    pub fn record(&self, session_id: &str) -> Option<SessionTrustRecord> {
        let now = self.clock.now();
        self.records
            .get(session_id)
            .filter(|record| record.value().is_active_at(now))
            .map(|record| record.value().clone())
    }

    /// Drop a session's grant before it expires.
    pub fn revoke(&self, session_id: &str) -> bool {
        let removed = self.records.remove(session_id).is_some();
        if removed {
            info!("Session trust revoked: session={}", session_id);
        }
        removed
    }

    /// Remove expired records. Only frees memory; reads already ignore them.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| record.is_active_at(now));
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for SessionTrustStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, SessionTrustStore) {
        let clock = Arc::new(ManualClock::default());
        let store = SessionTrustStore::with_clock(clock.clone());
        (clock, store)
    }

    #[test]
    fn test_default_level_is_low() {
        let (_, store) = store();
        assert_eq!(store.current_level("unknown"), RiskTier::Low);
    }

    #[test]
    fn test_elevation_until_expiry_inclusive() {
        let (clock, store) = store();
        store.elevate("s1", RiskTier::High, Duration::minutes(30));

        clock.advance(Duration::minutes(30));
        assert_eq!(store.current_level("s1"), RiskTier::High);

        clock.advance(Duration::milliseconds(1));
        assert_eq!(store.current_level("s1"), RiskTier::Low);
    }

    #[test]
    fn test_elevation_replaces_previous_record() {
        let (_, store) = store();
        store.elevate("s1", RiskTier::Critical, Duration::minutes(5));
        store.elevate("s1", RiskTier::Medium, Duration::minutes(5));
        assert_eq!(store.current_level("s1"), RiskTier::Medium);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let (_, store) = store();
        store.elevate("a", RiskTier::High, Duration::minutes(5));
        assert_eq!(store.current_level("a"), RiskTier::High);
        assert_eq!(store.current_level("b"), RiskTier::Low);
    }

    #[test]
    fn test_revoke() {
        let (_, store) = store();
        store.elevate("s1", RiskTier::High, Duration::minutes(5));
        assert!(store.revoke("s1"));
        assert!(!store.revoke("s1"));
        assert_eq!(store.current_level("s1"), RiskTier::Low);
    }

    #[test]
    fn test_purge_expired_only_removes_stale_records() {
        let (clock, store) = store();
        store.elevate("short", RiskTier::High, Duration::minutes(1));
        store.elevate("long", RiskTier::High, Duration::minutes(60));
        clock.advance(Duration::minutes(2));

        assert_eq!(store.purge_expired(), 1);
        assert!(store.record("short").is_none());
        assert!(store.record("long").is_some());
    }

    #[test]
    fn test_concurrent_elevations_across_sessions() {
        let store = Arc::new(SessionTrustStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.elevate(&format!("s{i}"), RiskTier::Medium, Duration::minutes(5));
                        assert_eq!(store.current_level(&format!("s{i}")), RiskTier::Medium);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8);
    }
}
