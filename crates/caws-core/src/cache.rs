//! In-memory policy cache keyed by absolute project path.
//!
//! Staleness is checked lazily on access: an entry older than the TTL reads
//! as absent but stays in the map until it is overwritten, invalidated, or
//! cleared. A single mutex guards the map so a shared cache never hands out
//! a half-written entry.

use crate::clock::Clock;
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CacheEntry {
    policy: Policy,
    loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_cached: usize,
    pub valid_caches: usize,
    pub expired_caches: usize,
}

pub struct PolicyCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl PolicyCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached policy for `root` if present and younger than the TTL.
    pub fn get(&self, root: &Path) -> Option<Policy> {
        let key = cache_key(root);
        let now = self.clock.now();
        let entries = self.lock();
        entries
            .get(&key)
            .filter(|entry| self.is_fresh(entry.loaded_at, now))
            .map(|entry| entry.policy.clone())
    }

    pub fn set(&self, root: &Path, policy: Policy) {
        let key = cache_key(root);
        let entry = CacheEntry {
            policy,
            loaded_at: self.clock.now(),
        };
        self.lock().insert(key, entry);
    }

    /// Drop the entry for `root`. Returns whether one existed.
    pub fn invalidate(&self, root: &Path) -> bool {
        self.lock().remove(&cache_key(root)).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.lock();
        let valid_caches = entries
            .values()
            .filter(|entry| self.is_fresh(entry.loaded_at, now))
            .count();
        CacheStats {
            total_cached: entries.len(),
            valid_caches,
            expired_caches: entries.len() - valid_caches,
        }
    }

    fn is_fresh(&self, loaded_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - loaded_at).to_std() {
            Ok(age) => age < self.ttl,
            // loaded_at is ahead of now: the clock stepped backwards, so the
            // entry's age is unknown
            Err(_) => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.lock().len())
            .finish()
    }
}

/// Absolute form of `root` so `.` and `/abs/path` share one entry.
fn cache_key(root: &Path) -> PathBuf {
    if let Ok(canonical) = root.canonicalize() {
        return canonical;
    }
    if root.is_absolute() {
        return root.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(root))
        .unwrap_or_else(|_| root.to_path_buf())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{RiskTier, TierBudget};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn cache_with(clock: &Arc<ManualClock>, ttl_secs: u64) -> PolicyCache {
        PolicyCache::new(Duration::from_secs(ttl_secs), clock.clone())
    }

    fn custom_policy(max_files: u32) -> Policy {
        let mut policy = Policy::default_policy();
        policy.is_default = false;
        policy
            .risk_tiers
            .set(RiskTier::Tier1, TierBudget::new(max_files, 100));
        policy
    }

    #[test]
    fn get_returns_fresh_entry() {
        let clock = clock();
        let cache = cache_with(&clock, 5);
        let dir = TempDir::new().unwrap();
        assert!(cache.get(dir.path()).is_none());

        cache.set(dir.path(), custom_policy(7));
        clock.advance(chrono::Duration::seconds(4));
        let hit = cache.get(dir.path()).unwrap();
        assert_eq!(hit.budget_for(RiskTier::Tier1).max_files, 7);
    }

    #[test]
    fn entry_expires_at_ttl_but_is_not_evicted() {
        let clock = clock();
        let cache = cache_with(&clock, 5);
        let dir = TempDir::new().unwrap();
        cache.set(dir.path(), custom_policy(7));

        clock.advance(chrono::Duration::seconds(5));
        assert!(cache.get(dir.path()).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                total_cached: 1,
                valid_caches: 0,
                expired_caches: 1,
            }
        );
    }

    #[test]
    fn set_refreshes_timestamp() {
        let clock = clock();
        let cache = cache_with(&clock, 5);
        let dir = TempDir::new().unwrap();
        cache.set(dir.path(), custom_policy(1));
        clock.advance(chrono::Duration::seconds(4));
        cache.set(dir.path(), custom_policy(2));
        clock.advance(chrono::Duration::seconds(4));
        let hit = cache.get(dir.path()).unwrap();
        assert_eq!(hit.budget_for(RiskTier::Tier1).max_files, 2);
    }

    #[test]
    fn invalidate_and_clear() {
        let clock = clock();
        let cache = cache_with(&clock, 60);
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        cache.set(a.path(), custom_policy(1));
        cache.set(b.path(), custom_policy(2));

        assert!(cache.invalidate(a.path()));
        assert!(!cache.invalidate(a.path()));
        assert!(cache.get(a.path()).is_none());
        assert!(cache.get(b.path()).is_some());

        cache.clear();
        assert_eq!(cache.stats().total_cached, 0);
    }

    #[test]
    fn stats_are_computed_at_call_time() {
        let clock = clock();
        let cache = cache_with(&clock, 10);
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        cache.set(a.path(), custom_policy(1));
        clock.advance(chrono::Duration::seconds(6));
        cache.set(b.path(), custom_policy(2));

        assert_eq!(cache.stats().valid_caches, 2);
        clock.advance(chrono::Duration::seconds(6));
        let stats = cache.stats();
        assert_eq!(stats.total_cached, 2);
        assert_eq!(stats.valid_caches, 1);
        assert_eq!(stats.expired_caches, 1);
    }

    #[test]
    fn relative_and_absolute_paths_share_entry() {
        let clock = clock();
        let cache = cache_with(&clock, 60);
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("proj");
        std::fs::create_dir_all(&nested).unwrap();
        cache.set(&nested, custom_policy(3));
        assert!(cache.get(&nested.join("..").join("proj")).is_some());
    }

    #[test]
    fn backwards_clock_step_expires_entry() {
        let clock = clock();
        let cache = cache_with(&clock, 5);
        let dir = TempDir::new().unwrap();
        cache.set(dir.path(), custom_policy(1));
        clock.advance(chrono::Duration::days(-30));
        assert!(cache.get(dir.path()).is_none());
        assert_eq!(cache.stats().expired_caches, 1);

        cache.set(dir.path(), custom_policy(2));
        assert!(cache.get(dir.path()).is_some());
    }

    #[test]
    fn zero_ttl_never_hits() {
        let clock = clock();
        let cache = cache_with(&clock, 0);
        let dir = TempDir::new().unwrap();
        cache.set(dir.path(), custom_policy(1));
        assert!(cache.get(dir.path()).is_none());
    }

    #[test]
    fn shared_across_threads() {
        let clock = clock();
        let cache = Arc::new(cache_with(&clock, 60));
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let root = root.clone();
                std::thread::spawn(move || {
                    cache.set(&root, custom_policy(i));
                    cache.get(&root).is_some()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(cache.stats().total_cached, 1);
    }
}
