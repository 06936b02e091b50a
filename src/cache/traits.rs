//! Core traits and types for the caching system.

use crate::api::EntityId;

/// Trait for entities that can be cached.
///
/// Implementors provide the identifier the cache is keyed by.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Unique identifier for this entity within its type
  fn cache_id(&self) -> EntityId;

  /// Entity type name used in logs and messages (e.g., "property", "tenant")
  fn entity_type() -> &'static str;
}

/// Result from a cache operation, including data and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched by this call (or by a concurrent call it joined)
  Network,
  /// Served from memory without a request
  Cache,
}
