use serde::Deserialize;

/// Tuning for the TTL cache engine.
///
/// All fields have working defaults; a host application can deserialize a
/// partial block from its YAML config and let serde fill in the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// TTL applied when `set` is not given an explicit one, in milliseconds.
  pub default_ttl_ms: u64,
  /// Entry count at which oldest-first eviction kicks in.
  pub max_entries: usize,
  /// Background sweep period in milliseconds. Zero disables the sweeper;
  /// lazy expiry on read still applies.
  pub gc_interval_ms: u64,
  /// Sliding expiration: every hit resets the entry's expiry to
  /// now + default TTL instead of keeping the insert-time deadline.
  pub update_on_access: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_ms: 300_000,
      max_entries: 1000,
      gc_interval_ms: 60_000,
      update_on_access: false,
    }
  }
}

impl CacheConfig {
  /// Default TTL as a chrono duration for expiry arithmetic.
  pub fn default_ttl(&self) -> chrono::Duration {
    chrono::Duration::milliseconds(self.default_ttl_ms as i64)
  }

  /// Sweep period as a std duration for the timer.
  pub fn gc_interval(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.gc_interval_ms)
  }
}

/// Tuning for the action queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Failed attempts allowed per action before it is parked as failed and
  /// left for an explicit retry.
  pub max_retries: u32,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self { max_retries: 3 }
  }
}
