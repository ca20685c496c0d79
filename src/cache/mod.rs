//! Generic caching layer for offline support and session persistence.
//!
//! This module is provider-agnostic:
//! - A TTL cache holds provider responses with per-entry expiry, bounded
//!   capacity, and hit/miss/eviction/expiration stats
//! - A background sweep reclaims expired entries even when nothing reads
//! - A persistence bridge carries query state across sessions through a
//!   pluggable byte store

mod engine;
mod persist;
mod storage;

pub use engine::{CacheEntry, CacheStats, TtlCache};
pub use persist::{hash_query_key, PersistedQuery, QueryPersistor};
pub use storage::{MemoryStorage, SessionStorage, StorageBackend};
