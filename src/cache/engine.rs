//! Generic TTL cache with capacity-bounded eviction and a background sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::config::CacheConfig;

/// A single cached value with its expiry bookkeeping.
///
/// Entries never leave the engine by reference; `get` hands out clones of
/// the value and `entries` clones whole entries for snapshotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub value: T,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub hits: u64,
}

/// Running counters over cache behavior.
///
/// `entries` tracks the live map size; the rest only ever grow until
/// `reset_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: u64,
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  pub expirations: u64,
}

struct CacheState<T> {
  map: HashMap<String, CacheEntry<T>>,
  stats: CacheStats,
  config: CacheConfig,
}

impl<T> CacheState<T> {
  /// Check whether `key` holds a live entry, dropping it if it has expired.
  fn live(&mut self, key: &str, now: DateTime<Utc>) -> bool {
    match self.map.get(key) {
      None => false,
      Some(entry) if now > entry.expires_at => {
        self.map.remove(key);
        self.stats.entries = self.stats.entries.saturating_sub(1);
        self.stats.expirations += 1;
        false
      }
      Some(_) => true,
    }
  }

  /// Remove the entry with the earliest creation time. Oldest-first, not
  /// LRU: refreshing a key never protects other keys from eviction, and
  /// `max_entries` is small enough that the scan does not matter.
  fn evict_oldest(&mut self) {
    let oldest = self
      .map
      .iter()
      .min_by_key(|(_, entry)| entry.created_at)
      .map(|(key, _)| key.clone());

    if let Some(key) = oldest {
      self.map.remove(&key);
      self.stats.entries = self.stats.entries.saturating_sub(1);
      self.stats.evictions += 1;
    }
  }

  /// Insert under the capacity bound. Only a brand-new key can trigger
  /// eviction; overwriting an existing key never does.
  fn insert(&mut self, key: String, entry: CacheEntry<T>) {
    if !self.map.contains_key(&key) && self.map.len() >= self.config.max_entries {
      self.evict_oldest();
    }
    if self.map.insert(key, entry).is_none() {
      self.stats.entries += 1;
    }
  }

  /// Drop every expired entry and re-seed the size counter.
  fn sweep(&mut self, now: DateTime<Utc>) -> usize {
    let before = self.map.len();
    self.map.retain(|_, entry| now <= entry.expires_at);
    let removed = before - self.map.len();
    self.stats.expirations += removed as u64;
    self.stats.entries = self.map.len() as u64;
    removed
  }
}

fn lock_state<T>(state: &Mutex<CacheState<T>>) -> MutexGuard<'_, CacheState<T>> {
  // A poisoned lock still holds a usable map; cache operations stay total.
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the background sweep task.
struct Sweeper {
  task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Sweeper {
  fn stop(&self) {
    let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(task) = task.take() {
      task.abort();
    }
  }
}

impl Drop for Sweeper {
  fn drop(&mut self) {
    self.stop();
  }
}

/// Generic key/value store with per-entry expiry.
///
/// Expiry is checked lazily on every read, so a cold cache does no work,
/// and eagerly on a periodic sweep, so a cache that is never read does not
/// hold expired data indefinitely. The sweep task holds only a weak
/// reference and is aborted on [`destroy`](Self::destroy) or when the last
/// handle is dropped; it cannot keep an idle process alive.
///
/// Cloning yields another handle onto the same store, the same way the
/// underlying storage is shared across clones of a client.
pub struct TtlCache<T> {
  state: Arc<Mutex<CacheState<T>>>,
  sweeper: Arc<Sweeper>,
}

impl<T: Clone + Send + 'static> TtlCache<T> {
  /// Create a cache and, when running inside a tokio runtime, start its
  /// background sweep.
  pub fn new(config: CacheConfig) -> Self {
    let state = Arc::new(Mutex::new(CacheState {
      map: HashMap::new(),
      stats: CacheStats::default(),
      config,
    }));

    let task = Self::spawn_sweeper(&state, config.gc_interval());

    Self {
      state,
      sweeper: Arc::new(Sweeper {
        task: Mutex::new(task),
      }),
    }
  }

  /// Create a cache with default tuning.
  pub fn with_defaults() -> Self {
    Self::new(CacheConfig::default())
  }

  fn spawn_sweeper(
    state: &Arc<Mutex<CacheState<T>>>,
    period: std::time::Duration,
  ) -> Option<tokio::task::JoinHandle<()>> {
    if period.is_zero() {
      return None;
    }

    // Without a runtime there is nothing to drive the sweep; lazy expiry
    // on read still holds, the cache just is not trimmed while idle.
    let runtime = match tokio::runtime::Handle::try_current() {
      Ok(handle) => handle,
      Err(_) => return None,
    };

    let state = Arc::downgrade(state);
    Some(runtime.spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick of an interval completes immediately.
      ticker.tick().await;

      loop {
        ticker.tick().await;
        let state = match state.upgrade() {
          Some(state) => state,
          None => break,
        };
        let removed = lock_state(&state).sweep(Utc::now());
        if removed > 0 {
          debug!(removed, "cache sweep dropped expired entries");
        }
      }
    }))
  }

  /// Look up a value, counting a hit or a miss.
  ///
  /// An expired entry is removed first and counts as an expiration followed
  /// by a miss, never a hit. With sliding expiration enabled, a hit pushes
  /// the entry's expiry out to now + default TTL.
  pub fn get(&self, key: &str) -> Option<T> {
    let mut state = lock_state(&self.state);
    let now = Utc::now();

    if !state.live(key, now) {
      state.stats.misses += 1;
      return None;
    }

    state.stats.hits += 1;
    let refreshed = if state.config.update_on_access {
      Some(now + state.config.default_ttl())
    } else {
      None
    };

    let entry = state.map.get_mut(key)?;
    entry.hits += 1;
    if let Some(expires_at) = refreshed {
      entry.expires_at = expires_at;
    }
    Some(entry.value.clone())
  }

  /// Store a value under `key`, evicting the oldest entry if a new key
  /// would push the map past capacity. `ttl` falls back to the configured
  /// default.
  pub fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
    let mut state = lock_state(&self.state);
    let now = Utc::now();
    let expires_at = now + ttl.unwrap_or_else(|| state.config.default_ttl());

    state.insert(
      key.to_string(),
      CacheEntry {
        value,
        created_at: now,
        expires_at,
        hits: 0,
      },
    );
  }

  /// Whether `key` holds a live entry. Expired entries are removed exactly
  /// as in `get`, but neither hit nor miss counters move.
  pub fn has(&self, key: &str) -> bool {
    let mut state = lock_state(&self.state);
    state.live(key, Utc::now())
  }

  /// Remove `key`; true iff it was present.
  pub fn delete(&self, key: &str) -> bool {
    let mut state = lock_state(&self.state);
    if state.map.remove(key).is_some() {
      state.stats.entries = state.stats.entries.saturating_sub(1);
      true
    } else {
      false
    }
  }

  /// Drop every entry. Counters other than `entries` are left running.
  pub fn clear(&self) {
    let mut state = lock_state(&self.state);
    state.map.clear();
    state.stats.entries = 0;
  }

  pub fn keys(&self) -> Vec<String> {
    lock_state(&self.state).map.keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    lock_state(&self.state).map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Snapshot every live entry for serialization. Expired entries are
  /// omitted but not removed; removal belongs to reads and `gc`.
  pub fn entries(&self) -> Vec<(String, CacheEntry<T>)> {
    let state = lock_state(&self.state);
    let now = Utc::now();
    state
      .map
      .iter()
      .filter(|(_, entry)| now <= entry.expires_at)
      .map(|(key, entry)| (key.clone(), entry.clone()))
      .collect()
  }

  /// Re-insert snapshotted entries, silently dropping any that have
  /// expired since they were taken.
  pub fn restore(&self, entries: Vec<(String, CacheEntry<T>)>) {
    let mut state = lock_state(&self.state);
    let now = Utc::now();
    for (key, entry) in entries {
      if now > entry.expires_at {
        continue;
      }
      state.insert(key, entry);
    }
  }

  /// Sweep the whole map once, returning how many expired entries were
  /// removed. The `entries` counter is re-seeded from the post-sweep size.
  pub fn gc(&self) -> usize {
    let mut state = lock_state(&self.state);
    state.sweep(Utc::now())
  }

  /// Value copy of the running counters.
  pub fn stats(&self) -> CacheStats {
    lock_state(&self.state).stats
  }

  /// Zero the counters, re-seeding `entries` from the live map size.
  pub fn reset_stats(&self) {
    let mut state = lock_state(&self.state);
    state.stats = CacheStats {
      entries: state.map.len() as u64,
      ..CacheStats::default()
    };
  }

  /// Stop the background sweep and drop every entry. Idempotent; meant for
  /// session teardown.
  pub fn destroy(&self) {
    self.sweeper.stop();
    self.clear();
  }
}

impl<T> Clone for TtlCache<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
      sweeper: Arc::clone(&self.sweeper),
    }
  }
}

impl<T> std::fmt::Debug for TtlCache<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = lock_state(&self.state);
    f.debug_struct("TtlCache")
      .field("entries", &state.map.len())
      .field("stats", &state.stats)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread::sleep;
  use std::time::Duration as StdDuration;

  fn cache(config: CacheConfig) -> TtlCache<String> {
    TtlCache::new(config)
  }

  fn no_sweep() -> CacheConfig {
    CacheConfig {
      gc_interval_ms: 0,
      ..CacheConfig::default()
    }
  }

  #[test]
  fn test_set_then_get() {
    let cache = cache(no_sweep());
    cache.set("pr:42", "open".to_string(), None);

    assert_eq!(cache.get("pr:42"), Some("open".to_string()));
    assert_eq!(cache.get("pr:43"), None);

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
  }

  #[test]
  fn test_expired_entry_is_a_miss() {
    let cache = cache(no_sweep());
    cache.set("pr:42", "open".to_string(), Some(Duration::milliseconds(20)));

    sleep(StdDuration::from_millis(50));

    assert_eq!(cache.get("pr:42"), None);
    assert!(!cache.has("pr:42"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.entries, 0);
  }

  #[test]
  fn test_has_does_not_move_hit_or_miss_counters() {
    let cache = cache(no_sweep());
    cache.set("pr:42", "open".to_string(), Some(Duration::milliseconds(20)));

    assert!(cache.has("pr:42"));
    sleep(StdDuration::from_millis(50));
    assert!(!cache.has("pr:42"));

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.expirations, 1);
  }

  #[test]
  fn test_sliding_expiration_extends_life() {
    let config = CacheConfig {
      default_ttl_ms: 100,
      update_on_access: true,
      ..no_sweep()
    };
    let cache = cache(config);
    cache.set("pr:42", "open".to_string(), None);

    // Two accesses spaced under the TTL keep the entry alive well past
    // the original deadline.
    sleep(StdDuration::from_millis(60));
    assert_eq!(cache.get("pr:42"), Some("open".to_string()));
    sleep(StdDuration::from_millis(60));
    assert_eq!(cache.get("pr:42"), Some("open".to_string()));
  }

  #[test]
  fn test_fixed_ttl_without_sliding() {
    let config = CacheConfig {
      default_ttl_ms: 100,
      ..no_sweep()
    };
    let cache = cache(config);
    cache.set("pr:42", "open".to_string(), None);

    sleep(StdDuration::from_millis(60));
    assert_eq!(cache.get("pr:42"), Some("open".to_string()));
    sleep(StdDuration::from_millis(60));
    assert_eq!(cache.get("pr:42"), None);
  }

  #[test]
  fn test_oldest_first_eviction() {
    let config = CacheConfig {
      default_ttl_ms: 1000,
      max_entries: 3,
      ..no_sweep()
    };
    let cache = cache(config);

    cache.set("a", "1".to_string(), None);
    sleep(StdDuration::from_millis(10));
    cache.set("b", "2".to_string(), None);
    sleep(StdDuration::from_millis(10));
    cache.set("c", "3".to_string(), None);
    sleep(StdDuration::from_millis(10));
    cache.set("d", "4".to_string(), None);

    assert_eq!(cache.get("a"), None);
    assert!(cache.get("b").is_some());
    assert!(cache.get("c").is_some());
    assert!(cache.get("d").is_some());
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.len(), 3);
  }

  #[test]
  fn test_overwrite_never_evicts() {
    let config = CacheConfig {
      max_entries: 2,
      ..no_sweep()
    };
    let cache = cache(config);

    cache.set("a", "1".to_string(), None);
    sleep(StdDuration::from_millis(10));
    cache.set("b", "2".to_string(), None);
    cache.set("a", "1'".to_string(), None);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.stats().entries, 2);
    assert_eq!(cache.get("a"), Some("1'".to_string()));
    assert_eq!(cache.get("b"), Some("2".to_string()));
  }

  #[test]
  fn test_gc_is_idempotent() {
    let cache = cache(no_sweep());
    cache.set("a", "1".to_string(), Some(Duration::milliseconds(10)));
    cache.set("b", "2".to_string(), Some(Duration::milliseconds(10)));
    cache.set("c", "3".to_string(), None);

    sleep(StdDuration::from_millis(40));

    assert_eq!(cache.gc(), 2);
    assert_eq!(cache.gc(), 0);
    assert_eq!(cache.stats().entries, 1);
    assert_eq!(cache.stats().expirations, 2);
  }

  #[test]
  fn test_snapshot_restore_round_trip() {
    let cache = cache(no_sweep());
    cache.set("a", "1".to_string(), None);
    cache.set("b", "2".to_string(), None);
    cache.set("gone", "x".to_string(), Some(Duration::milliseconds(10)));

    sleep(StdDuration::from_millis(40));
    let snapshot = cache.entries();
    assert_eq!(snapshot.len(), 2);

    let restored: TtlCache<String> = TtlCache::new(no_sweep());
    restored.restore(snapshot);

    assert_eq!(restored.get("a"), Some("1".to_string()));
    assert_eq!(restored.get("b"), Some("2".to_string()));
    assert_eq!(restored.get("gone"), None);
    assert_eq!(restored.stats().entries, 2);
  }

  #[test]
  fn test_restore_drops_entries_expired_in_transit() {
    let cache: TtlCache<String> = TtlCache::new(no_sweep());
    let now = Utc::now();
    cache.restore(vec![
      (
        "stale".to_string(),
        CacheEntry {
          value: "x".to_string(),
          created_at: now - Duration::hours(2),
          expires_at: now - Duration::hours(1),
          hits: 3,
        },
      ),
      (
        "live".to_string(),
        CacheEntry {
          value: "y".to_string(),
          created_at: now,
          expires_at: now + Duration::hours(1),
          hits: 0,
        },
      ),
    ]);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("live"), Some("y".to_string()));
  }

  #[test]
  fn test_reset_stats_reseeds_entries() {
    let cache = cache(no_sweep());
    cache.set("a", "1".to_string(), None);
    cache.get("a");
    cache.get("missing");

    cache.reset_stats();
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.expirations, 0);
  }

  #[test]
  fn test_delete_and_clear() {
    let cache = cache(no_sweep());
    cache.set("a", "1".to_string(), None);
    cache.set("b", "2".to_string(), None);

    assert!(cache.delete("a"));
    assert!(!cache.delete("a"));
    assert_eq!(cache.stats().entries, 1);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().entries, 0);
  }

  #[tokio::test]
  async fn test_background_sweep_trims_idle_cache() {
    let config = CacheConfig {
      default_ttl_ms: 10,
      gc_interval_ms: 25,
      ..CacheConfig::default()
    };
    let cache: TtlCache<String> = TtlCache::new(config);
    cache.set("a", "1".to_string(), None);
    cache.set("b", "2".to_string(), None);

    tokio::time::sleep(StdDuration::from_millis(120)).await;

    // No reads happened; the sweeper alone reclaimed the entries.
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.stats().expirations, 2);
  }

  #[tokio::test]
  async fn test_destroy_is_idempotent() {
    let cache: TtlCache<String> = TtlCache::with_defaults();
    cache.set("a", "1".to_string(), None);

    cache.destroy();
    cache.destroy();
    assert!(cache.is_empty());
  }
}
