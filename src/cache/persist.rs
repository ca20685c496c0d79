//! Persistence bridge between the UI's query client and the TTL cache.

use chrono::Duration;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::engine::{CacheEntry, TtlCache};
use super::storage::StorageBackend;

/// One named, versioned query as the UI's query client snapshots it: an
/// opaque key, the key's stable hash, the latest payload, and optional
/// metadata. Records are written wholesale on every persist cycle; there
/// is no merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuery {
  pub query_key: Value,
  pub query_hash: String,
  pub state: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub meta: Option<HashMap<String, Value>>,
}

impl PersistedQuery {
  /// Build a record, hashing the key the stable way.
  pub fn new(query_key: Value, state: Value) -> Self {
    let query_hash = hash_query_key(&query_key);
    Self {
      query_key,
      query_hash,
      state,
      meta: None,
    }
  }

  pub fn with_meta(mut self, meta: HashMap<String, Value>) -> Self {
    self.meta = Some(meta);
    self
  }
}

/// Hash a query key for stable, fixed-length cache keys.
pub fn hash_query_key(query_key: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(query_key.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

/// Bridges query-client snapshots onto a [`TtlCache`], optionally
/// mirroring cache contents through a [`StorageBackend`] so the next
/// session can pick them back up.
///
/// Every record lands under `"<namespace>:<query_hash>"` with a 24-hour
/// TTL by default. The cache handle is passed in, not owned globally; one
/// engine instance can back several persistors under distinct namespaces.
pub struct QueryPersistor {
  cache: TtlCache<PersistedQuery>,
  namespace: String,
  ttl: Duration,
  storage: Option<Arc<dyn StorageBackend>>,
}

impl QueryPersistor {
  pub fn new(cache: TtlCache<PersistedQuery>) -> Self {
    Self {
      cache,
      namespace: "queries".to_string(),
      ttl: Duration::hours(24),
      storage: None,
    }
  }

  /// Change the key namespace for this persistor.
  pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
    self.namespace = namespace.into();
    self
  }

  /// Change how long persisted records live in the cache.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Mirror cache contents through an external byte store.
  pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
    self.storage = Some(storage);
    self
  }

  fn entry_key(&self, query_hash: &str) -> String {
    format!("{}:{}", self.namespace, query_hash)
  }

  fn prefix(&self) -> String {
    format!("{}:", self.namespace)
  }

  /// Write every record from the client's snapshot into the cache,
  /// wholesale, then mirror the engine's live entries through the byte
  /// store if one is attached.
  pub fn persist_client(&self, snapshot: &[PersistedQuery]) -> Result<()> {
    for record in snapshot {
      self
        .cache
        .set(&self.entry_key(&record.query_hash), record.clone(), Some(self.ttl));
    }

    if let Some(storage) = &self.storage {
      let serialized = serde_json::to_string(&self.cache.entries())?;
      storage.set_item(&self.namespace, &serialized)?;
    }

    Ok(())
  }

  /// Collect the previous session's records, if any.
  ///
  /// With a byte store attached, its snapshot is restored into the cache
  /// first; an unreadable payload is skipped and treated as no prior
  /// session rather than an error. Returns `None` when nothing was found.
  pub fn restore_client(&self) -> Result<Option<Vec<PersistedQuery>>> {
    if let Some(storage) = &self.storage {
      if let Some(serialized) = storage.get_item(&self.namespace)? {
        match serde_json::from_str::<Vec<(String, CacheEntry<PersistedQuery>)>>(&serialized) {
          Ok(entries) => self.cache.restore(entries),
          Err(err) => warn!(%err, "discarding unreadable session snapshot"),
        }
      }
    }

    let prefix = self.prefix();
    let mut records = Vec::new();
    for key in self.cache.keys() {
      if !key.starts_with(&prefix) {
        continue;
      }
      if let Some(record) = self.cache.get(&key) {
        records.push(record);
      }
    }

    if records.is_empty() {
      return Ok(None);
    }
    Ok(Some(records))
  }

  /// Forget the persisted session: every namespaced cache entry, plus the
  /// byte-store mirror if one is attached.
  pub fn remove_client(&self) -> Result<()> {
    let prefix = self.prefix();
    for key in self.cache.keys() {
      if key.starts_with(&prefix) {
        self.cache.delete(&key);
      }
    }

    if let Some(storage) = &self.storage {
      storage.remove_item(&self.namespace)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::config::CacheConfig;
  use serde_json::json;

  fn cache() -> TtlCache<PersistedQuery> {
    TtlCache::new(CacheConfig {
      gc_interval_ms: 0,
      ..CacheConfig::default()
    })
  }

  fn sample_snapshot() -> Vec<PersistedQuery> {
    vec![
      PersistedQuery::new(
        json!(["pulls", "octocat/hello-world", "open"]),
        json!({ "data": [{ "number": 1 }], "dataUpdatedAt": 1700000000 }),
      ),
      PersistedQuery::new(
        json!(["comments", "octocat/hello-world", 1]),
        json!({ "data": [], "dataUpdatedAt": 1700000100 }),
      )
      .with_meta(HashMap::from([("provider".to_string(), json!("github"))])),
    ]
  }

  fn sorted(mut records: Vec<PersistedQuery>) -> Vec<PersistedQuery> {
    records.sort_by(|a, b| a.query_hash.cmp(&b.query_hash));
    records
  }

  #[test]
  fn test_query_hash_is_stable_and_unique_per_key() {
    let a = json!(["pulls", "octocat/hello-world"]);
    let b = json!(["pulls", "octocat/other"]);

    assert_eq!(hash_query_key(&a), hash_query_key(&a));
    assert_ne!(hash_query_key(&a), hash_query_key(&b));
    assert_eq!(hash_query_key(&a).len(), 64);
  }

  #[test]
  fn test_persist_then_restore_same_engine() {
    let persistor = QueryPersistor::new(cache());
    let snapshot = sample_snapshot();

    persistor.persist_client(&snapshot).unwrap();
    let restored = persistor.restore_client().unwrap().unwrap();

    assert_eq!(sorted(restored), sorted(snapshot));
  }

  #[test]
  fn test_restore_on_empty_engine_is_no_prior_session() {
    let persistor = QueryPersistor::new(cache());
    assert!(persistor.restore_client().unwrap().is_none());
  }

  #[test]
  fn test_mirror_survives_engine_replacement() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::default());
    let snapshot = sample_snapshot();

    let first = QueryPersistor::new(cache()).with_storage(Arc::clone(&storage));
    first.persist_client(&snapshot).unwrap();

    // A fresh engine, as on the next session's startup.
    let second = QueryPersistor::new(cache()).with_storage(Arc::clone(&storage));
    let restored = second.restore_client().unwrap().unwrap();

    assert_eq!(sorted(restored), sorted(snapshot));
  }

  #[test]
  fn test_malformed_mirror_is_skipped() {
    let storage = Arc::new(MemoryStorage::default());
    storage.set_item("queries", "definitely not json").unwrap();

    let persistor = QueryPersistor::new(cache()).with_storage(storage);
    assert!(persistor.restore_client().unwrap().is_none());
  }

  #[test]
  fn test_remove_client_forgets_everything() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::default());
    let persistor = QueryPersistor::new(cache()).with_storage(Arc::clone(&storage));

    persistor.persist_client(&sample_snapshot()).unwrap();
    persistor.remove_client().unwrap();

    assert!(persistor.restore_client().unwrap().is_none());
    assert_eq!(storage.get_item("queries").unwrap(), None);
  }

  #[test]
  fn test_namespaces_do_not_collide() {
    let shared = cache();
    let pulls = QueryPersistor::new(shared.clone()).with_namespace("pulls");
    let reviews = QueryPersistor::new(shared).with_namespace("reviews");

    pulls.persist_client(&sample_snapshot()).unwrap();
    assert!(reviews.restore_client().unwrap().is_none());

    reviews.persist_client(&sample_snapshot()[..1]).unwrap();
    reviews.remove_client().unwrap();
    assert_eq!(pulls.restore_client().unwrap().unwrap().len(), 2);
  }
}
