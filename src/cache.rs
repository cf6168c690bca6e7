//! Verification cache
//!
//! Memoizes cross-validation records by a canonical hash of the submitted
//! sources. Entries expire after a TTL (24 hours by default) and are removed
//! by a periodic sweep rather than on the request path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crossval_types::{CrossValidationRecord, Identity, SourceSet, SourceSlot};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ComputationError;
use crate::matching::fuzzy::{has_formatting, normalize_phone};
use crate::store::{CacheEntry, SweepReport, VerificationStore};

// ---------------------------------------------------------------------------
// Canonical cache key
// ---------------------------------------------------------------------------

fn update_field(hasher: &mut Sha256, tag: &str, value: Option<String>) {
    hasher.update(tag.as_bytes());
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update((v.len() as u64).to_be_bytes());
            hasher.update(v.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn normalized(value: Option<&str>, f: impl Fn(&str) -> String) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(f)
}

fn update_identity(hasher: &mut Sha256, identity: &Identity) {
    hasher.update([identity.success as u8]);
    update_field(
        hasher,
        "user_id",
        normalized(identity.user_id.as_deref(), str::to_string),
    );
    update_field(
        hasher,
        "email",
        normalized(identity.email.as_deref(), str::to_lowercase),
    );
    // Phone comparison reads the digits and whether the untrimmed input
    // carries punctuation or spaces
    update_field(
        hasher,
        "phone",
        identity
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("{}|{}", normalize_phone(p), has_formatting(p) as u8)),
    );
    update_field(
        hasher,
        "name",
        normalized(identity.name.as_deref(), str::to_lowercase),
    );
    update_field(
        hasher,
        "account_ref",
        normalized(identity.account_ref.as_deref(), str::to_string),
    );
}

/// Canonical key for a source set: SHA-256 (hex) over the normalized
/// matching fields of each slot, in fixed slot and field order.
///
/// Each field is hashed in exactly the form the scorer reads it, so two
/// source sets share a key only when they score identically. Formatting the
/// scorer ignores (user id padding, email and name case) is normalized away.
pub fn cache_key(sources: &SourceSet) -> String {
    let mut hasher = Sha256::new();
    for slot in SourceSlot::ALL {
        hasher.update(slot.to_string().as_bytes());
        match sources.get(slot) {
            Some(identity) => {
                hasher.update([1u8]);
                update_identity(&mut hasher, identity);
            }
            None => hasher.update([0u8]),
        }
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries that failed their integrity check and were recomputed
    pub recomputed_corrupt: u64,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct VerificationCache {
    store: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    counters: CacheCounters,
}

impl VerificationCache {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        clock: Arc<dyn Clock>,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            counters: CacheCounters::default(),
        }
    }

    /// Live record for a key.
    ///
    /// Expired entries are a miss. An entry that fails its integrity check is
    /// evicted and reported as a miss so the caller recomputes.
    pub fn get(&self, key: &str) -> Option<CrossValidationRecord> {
        let now = self.clock.now();
        let entry = match self.store.cache_get(key) {
            Some(entry) if entry.is_live(now) => entry,
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                return None;
            }
        };

        if let Err(error) = check_entry(key, &entry) {
            warn!(error = %error, "Evicting corrupt cache entry");
            self.store.cache_remove(key, &entry.record.verification_id);
            self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            key = %key,
            verification_id = %entry.record.verification_id,
            "Cache hit"
        );
        Some(entry.record)
    }

    /// Store a record with the default TTL
    pub fn put(&self, key: &str, record: CrossValidationRecord) -> CrossValidationRecord {
        self.put_with_ttl(key, record, self.ttl)
    }

    /// Store a record unless a live entry already exists for the key.
    ///
    /// Returns the record that ends up cached, which is the existing one
    /// when another caller published first.
    pub fn put_with_ttl(
        &self,
        key: &str,
        record: CrossValidationRecord,
        ttl: Duration,
    ) -> CrossValidationRecord {
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            record,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.store.cache_insert_if_absent(entry, now).record
    }

    /// Cached record for the key, or compute, publish and return a new one
    pub fn get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> CrossValidationRecord,
    ) -> CrossValidationRecord {
        if let Some(record) = self.get(key) {
            return record;
        }
        self.put(key, compute())
    }

    /// Remove every entry that has expired
    pub fn sweep(&self) -> SweepReport {
        self.store.sweep_cache(self.clock.now())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            recomputed_corrupt: self.counters.corrupt.load(Ordering::Relaxed),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn check_entry(key: &str, entry: &CacheEntry) -> Result<(), ComputationError> {
    if entry.key != key {
        return Err(ComputationError::CorruptCacheEntry {
            key: key.to_string(),
            reason: "entry stored under a different key".to_string(),
        });
    }
    entry
        .record
        .check_invariants()
        .map_err(|reason| ComputationError::CorruptCacheEntry {
            key: key.to_string(),
            reason,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryStore;
    use crossval_types::SourceAvailability;
    use uuid::Uuid;

    fn record(clock: &ManualClock) -> CrossValidationRecord {
        CrossValidationRecord {
            verification_id: Uuid::new_v4(),
            timestamp: clock.now(),
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
        }
    }

    fn cache() -> (VerificationCache, Arc<ManualClock>, Arc<InMemoryStore>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryStore::new());
        let cache = VerificationCache::new(
            store.clone(),
            clock.clone(),
            std::time::Duration::from_secs(24 * 60 * 60),
        );
        (cache, clock, store)
    }

    #[test]
    fn test_cache_key_normalizes_fields() {
        let a = SourceSet::new(
            Identity::verified()
                .with_user_id("u1")
                .with_email("Bob@X.com ")
                .with_phone("+1 (555) 123-4567"),
        );
        let b = SourceSet::new(
            Identity::verified()
                .with_user_id(" u1 ")
                .with_email("bob@x.com")
                .with_phone("1-555-123-4567"),
        );
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a).len(), 64);
    }

    #[test]
    fn test_cache_key_keeps_phone_punctuation() {
        let plain = SourceSet::new(Identity::verified().with_phone("15551234567"));
        let spaced = SourceSet::new(Identity::verified().with_phone("+1 555 123 4567"));
        let padded = SourceSet::new(Identity::verified().with_phone(" 15551234567"));

        assert_ne!(cache_key(&plain), cache_key(&spaced));
        assert_ne!(cache_key(&plain), cache_key(&padded));
    }

    #[test]
    fn test_cache_key_distinguishes_slots_and_availability() {
        let bob = Identity::verified().with_email("bob@x.com");
        let primary_only = SourceSet::new(bob.clone());
        let with_secondary = SourceSet::new(bob.clone()).with_secondary(bob.clone());
        let with_tertiary = SourceSet::new(bob.clone()).with_tertiary(bob.clone());
        let failed = SourceSet::new(Identity {
            success: false,
            ..bob.clone()
        });

        let keys = [
            cache_key(&primary_only),
            cache_key(&with_secondary),
            cache_key(&with_tertiary),
            cache_key(&failed),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_get_respects_ttl() {
        let (cache, clock, _) = cache();
        let stored = cache.put("k", record(&clock));

        assert_eq!(cache.get("k"), Some(stored));
        clock.advance(Duration::hours(24));
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_get_or_compute_only_computes_once() {
        let (cache, clock, _) = cache();
        let mut calls = 0;

        let first = cache.get_or_compute("k", || {
            calls += 1;
            record(&clock)
        });
        let second = cache.get_or_compute("k", || {
            calls += 1;
            record(&clock)
        });

        assert_eq!(calls, 1);
        assert_eq!(first.verification_id, second.verification_id);
    }

    #[test]
    fn test_corrupt_entry_is_recomputed() {
        let (cache, clock, store) = cache();
        let mut bad = record(&clock);
        bad.confidence = 250.0;
        store.cache_insert_if_absent(
            CacheEntry {
                key: "k".to_string(),
                record: bad,
                expires_at: clock.now() + Duration::hours(1),
            },
            clock.now(),
        );

        assert_eq!(cache.get("k"), None);
        assert_eq!(store.cache_len(), 0);
        assert_eq!(cache.stats().recomputed_corrupt, 1);

        let fresh = cache.get_or_compute("k", || record(&clock));
        assert_eq!(fresh.confidence, 10.0);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let (cache, clock, store) = cache();
        cache.put("old", record(&clock));
        clock.advance(Duration::hours(23));
        cache.put("new", record(&clock));
        clock.advance(Duration::hours(2));

        let report = cache.sweep();
        assert_eq!(report.cache_entries, 1);
        assert_eq!(store.cache_len(), 1);
        assert!(cache.get("new").is_some());
    }
}
