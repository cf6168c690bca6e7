//! Shared mutable state behind a store abstraction
//!
//! The engine keeps three pieces of state: cached cross-validation records
//! keyed by canonical source hash, the same records indexed by verification
//! id, and per-identity rate-limit windows. A [`VerificationStore`] owns all
//! three and is handed to the engine at construction, so separate engines
//! (for example one per tenant) never share state by accident.
//!
//! ## Lifecycle
//!
//! 1. `init` - called once by the engine constructor
//! 2. `sweep` - called periodically, independent of the request path
//! 3. `teardown` - drops all state
//!
//! Every read-then-write sequence (`cache_insert_if_absent`,
//! `record_attempt`) is atomic with respect to other callers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use crossval_types::CrossValidationRecord;
use uuid::Uuid;

/// A cached record and its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub record: CrossValidationRecord,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// What a sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries: usize,
    pub records: usize,
    pub rate_windows: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.cache_entries + self.records + self.rate_windows
    }
}

/// Storage for cache entries, the verification-id index and rate windows.
///
/// Implementations must be safe to share across threads.
pub trait VerificationStore: Send + Sync {
    /// Prepare the store for use
    fn init(&self) {}

    /// Cache entry for a key, live or not; expiry is the caller's decision
    fn cache_get(&self, key: &str) -> Option<CacheEntry>;

    /// Publish an entry unless a live one already exists for its key.
    ///
    /// Returns the entry that is live after the call: the existing one if
    /// another caller won, otherwise `entry`. A published record is also
    /// indexed by its verification id.
    fn cache_insert_if_absent(&self, entry: CacheEntry, now: DateTime<Utc>) -> CacheEntry;

    /// Remove the entry for `key` and its verification-id index entry, but
    /// only while it still holds the record `verification_id`. Returns
    /// whether anything was removed.
    fn cache_remove(&self, key: &str, verification_id: &Uuid) -> bool;

    fn cache_len(&self) -> usize;

    /// Entry holding the record with this verification id
    fn record_get(&self, verification_id: &Uuid) -> Option<CacheEntry>;

    /// Record an attempt for `identity_key` at `now`.
    ///
    /// Attempts older than `window` are pruned first. Returns how many
    /// attempts were already in the window before this one was added.
    fn record_attempt(&self, identity_key: &str, now: DateTime<Utc>, window: Duration) -> usize;

    /// Remove expired cache entries and expired verification-id index entries
    fn sweep_cache(&self, now: DateTime<Utc>) -> SweepReport;

    /// Remove rate windows with no attempt inside `window`; returns how many
    fn sweep_rate_windows(&self, now: DateTime<Utc>, window: Duration) -> usize;

    /// Full sweep of all three kinds of state
    fn sweep(&self, now: DateTime<Utc>, rate_window: Duration) -> SweepReport {
        SweepReport {
            rate_windows: self.sweep_rate_windows(now, rate_window),
            ..self.sweep_cache(now)
        }
    }

    /// Drop all state
    fn teardown(&self);
}

// ============================================================================
// In-memory store
// ============================================================================

type AttemptWindow = Mutex<VecDeque<DateTime<Utc>>>;

/// Process-local store guarded by std locks.
///
/// Each rate window has its own lock, so attempts for an identity that
/// already has a window only need the shared map lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    cache: RwLock<HashMap<String, CacheEntry>>,
    records: RwLock<HashMap<Uuid, CacheEntry>>,
    rate_windows: RwLock<HashMap<String, AttemptWindow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_window_count(&self) -> usize {
        self.rate_windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drop attempts older than `window` from the front of a window
fn prune(attempts: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while attempts.front().is_some_and(|t| now - *t > window) {
        attempts.pop_front();
    }
}

/// Prune, count what is left, then record `now`
fn push_attempt(
    attempts: &mut VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> usize {
    prune(attempts, now, window);
    let prior = attempts.len();
    attempts.push_back(now);
    prior
}

/// No attempt inside the window; attempts are kept in time order
fn is_idle(attempts: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    attempts.back().map_or(true, |latest| now - *latest > window)
}

/// Remove entries that are expired at `now`.
///
/// Expired keys are collected under the read lock; the write lock is only
/// held to remove them, re-checking each in case it was replaced meanwhile.
fn sweep_expired<K>(map: &RwLock<HashMap<K, CacheEntry>>, now: DateTime<Utc>) -> usize
where
    K: std::hash::Hash + Eq + Clone,
{
    let expired: Vec<K> = {
        let guard = map.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect()
    };

    if expired.is_empty() {
        return 0;
    }

    let mut guard = map.write().unwrap_or_else(PoisonError::into_inner);
    let mut removed = 0;
    for key in expired {
        if guard.get(&key).is_some_and(|entry| !entry.is_live(now)) {
            guard.remove(&key);
            removed += 1;
        }
    }
    removed
}

impl VerificationStore for InMemoryStore {
    fn cache_get(&self, key: &str) -> Option<CacheEntry> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn cache_insert_if_absent(&self, entry: CacheEntry, now: DateTime<Utc>) -> CacheEntry {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(&entry.key) {
            if existing.is_live(now) {
                return existing.clone();
            }
        }

        cache.insert(entry.key.clone(), entry.clone());
        // Indexed under the cache lock: anything served from the cache is
        // also findable by id.
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.record.verification_id, entry.clone());
        entry
    }

    fn cache_remove(&self, key: &str, verification_id: &Uuid) -> bool {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if !cache
            .get(key)
            .is_some_and(|entry| entry.record.verification_id == *verification_id)
        {
            return false;
        }
        cache.remove(key);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(verification_id);
        true
    }

    fn cache_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record_get(&self, verification_id: &Uuid) -> Option<CacheEntry> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(verification_id)
            .cloned()
    }

    fn record_attempt(&self, identity_key: &str, now: DateTime<Utc>, window: Duration) -> usize {
        {
            let windows = self
                .rate_windows
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(attempts) = windows.get(identity_key) {
                let mut attempts = attempts.lock().unwrap_or_else(PoisonError::into_inner);
                return push_attempt(&mut attempts, now, window);
            }
        }

        // First attempt for this identity; another caller may have created
        // the window since the read lock was released
        let mut windows = self
            .rate_windows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let attempts = windows
            .entry(identity_key.to_string())
            .or_default()
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        push_attempt(attempts, now, window)
    }

    fn sweep_cache(&self, now: DateTime<Utc>) -> SweepReport {
        SweepReport {
            cache_entries: sweep_expired(&self.cache, now),
            records: sweep_expired(&self.records, now),
            rate_windows: 0,
        }
    }

    /// Idle identities are found under the shared lock, so attempts for
    /// existing windows proceed during the scan. The exclusive lock is only
    /// taken to remove them, re-checking each in case it saw a new attempt.
    fn sweep_rate_windows(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let idle: Vec<String> = {
            let windows = self
                .rate_windows
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            windows
                .iter()
                .filter(|(_, attempts)| {
                    is_idle(
                        &attempts.lock().unwrap_or_else(PoisonError::into_inner),
                        now,
                        window,
                    )
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        if idle.is_empty() {
            return 0;
        }

        let mut windows = self
            .rate_windows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for key in idle {
            let still_idle = windows.get_mut(&key).is_some_and(|attempts| {
                is_idle(
                    attempts.get_mut().unwrap_or_else(PoisonError::into_inner),
                    now,
                    window,
                )
            });
            if still_idle {
                windows.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    fn teardown(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.rate_windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossval_types::SourceAvailability;

    fn entry(key: &str, expires_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            record: CrossValidationRecord {
                verification_id: Uuid::new_v4(),
                timestamp: expires_at - Duration::hours(1),
                sources: SourceAvailability {
                    primary: true,
                    ..SourceAvailability::default()
                },
                pairwise_scores: vec![],
                overall_consistency: 0.0,
                confidence: 10.0,
                risk_score: 80.0,
                passed: true,
                issues: vec![],
            },
            expires_at,
        }
    }

    #[test]
    fn test_insert_if_absent_keeps_live_winner() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let first = entry("k", now + Duration::hours(1));
        let second = entry("k", now + Duration::hours(1));

        let won = store.cache_insert_if_absent(first.clone(), now);
        assert_eq!(won, first);
        let won = store.cache_insert_if_absent(second.clone(), now);
        assert_eq!(won, first);

        assert!(store.record_get(&first.record.verification_id).is_some());
        assert!(store.record_get(&second.record.verification_id).is_none());
    }

    #[test]
    fn test_insert_replaces_expired() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.cache_insert_if_absent(entry("k", now), now);
        let fresh = entry("k", now + Duration::hours(1));
        let won = store.cache_insert_if_absent(fresh.clone(), now);
        assert_eq!(won, fresh);
        assert_eq!(store.cache_len(), 1);
    }

    #[test]
    fn test_record_attempt_prunes_window() {
        let store = InMemoryStore::new();
        let start = Utc::now();
        let window = Duration::hours(1);

        for i in 0..3 {
            let prior = store.record_attempt("u1", start + Duration::minutes(i), window);
            assert_eq!(prior, i as usize);
        }

        // Two hours later the earlier attempts have aged out
        let prior = store.record_attempt("u1", start + Duration::hours(2), window);
        assert_eq!(prior, 0);
        assert_eq!(store.record_attempt("u2", start, window), 0);
    }

    #[test]
    fn test_sweep_removes_expired_state() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.cache_insert_if_absent(
            entry("old", now - Duration::seconds(1)),
            now - Duration::hours(2),
        );
        store.cache_insert_if_absent(entry("new", now + Duration::hours(1)), now);
        store.record_attempt("stale", now - Duration::hours(3), Duration::hours(1));
        store.record_attempt("active", now, Duration::hours(1));

        let report = store.sweep(now, Duration::hours(1));
        assert_eq!(report.cache_entries, 1);
        assert_eq!(report.records, 1);
        assert_eq!(report.rate_windows, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(store.cache_len(), 1);
        assert_eq!(store.rate_window_count(), 1);
    }

    #[test]
    fn test_cache_remove_only_removes_matching_record() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let corrupt = entry("k", now + Duration::hours(1));
        store.cache_insert_if_absent(corrupt.clone(), now);
        store.cache_remove("k", &corrupt.record.verification_id);

        // A valid record published after the corrupt one was read
        let valid = entry("k", now + Duration::hours(1));
        store.cache_insert_if_absent(valid.clone(), now);

        assert!(!store.cache_remove("k", &corrupt.record.verification_id));
        assert_eq!(store.cache_get("k"), Some(valid.clone()));
        assert!(store.record_get(&valid.record.verification_id).is_some());

        assert!(store.cache_remove("k", &valid.record.verification_id));
        assert_eq!(store.cache_len(), 0);
        assert!(store.record_get(&valid.record.verification_id).is_none());
    }

    #[test]
    fn test_attempts_proceed_during_window_scan() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let window = Duration::hours(1);
        store.record_attempt("u1", now, window);

        // The scan phase of a sweep holds only the shared map lock
        let scan = store
            .rate_windows
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let prior = store.record_attempt("u1", now + Duration::minutes(1), window);
                let _ = tx.send(prior);
            });
            let prior = rx.recv_timeout(std::time::Duration::from_secs(5));
            drop(scan);
            assert_eq!(prior, Ok(1));
        });
    }

    #[test]
    fn test_sweep_keeps_window_with_recent_attempt() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let window = Duration::hours(1);
        store.record_attempt("u1", now - Duration::hours(2), window);
        store.record_attempt("u1", now - Duration::minutes(10), window);
        store.record_attempt("u2", now - Duration::hours(2), window);

        assert_eq!(store.sweep_rate_windows(now, window), 1);
        assert_eq!(store.rate_window_count(), 1);
        assert_eq!(store.record_attempt("u1", now, window), 1);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let e = entry("k", now + Duration::hours(1));
        store.cache_insert_if_absent(e.clone(), now);
        store.record_attempt("u1", now, Duration::hours(1));

        store.teardown();

        assert_eq!(store.cache_len(), 0);
        assert!(store.record_get(&e.record.verification_id).is_none());
        assert_eq!(store.rate_window_count(), 0);
    }
}
