//! Cache storage trait and in-memory implementations.

use indexmap::IndexMap;
use std::num::NonZeroUsize;

use crate::api::EntityId;

/// Trait for cache storage backends.
///
/// Storage is plain key/value: sequencing and in-flight tracking live in the
/// cache layer, so a backend only has to remember values.
pub trait CacheStorage<T>: Send {
  /// Get a value, marking it as recently used.
  fn get(&mut self, id: EntityId) -> Option<T>;

  fn has(&self, id: EntityId) -> bool;

  fn set(&mut self, id: EntityId, value: T);

  fn remove(&mut self, id: EntityId) -> Option<T>;

  fn clear(&mut self);

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl<T> CacheStorage<T> for NoopStorage {
  fn get(&mut self, _id: EntityId) -> Option<T> {
    None // Always miss
  }

  fn has(&self, _id: EntityId) -> bool {
    false
  }

  fn set(&mut self, _id: EntityId, _value: T) {
    // Discard
  }

  fn remove(&mut self, _id: EntityId) -> Option<T> {
    None
  }

  fn clear(&mut self) {}

  fn len(&self) -> usize {
    0
  }
}

/// In-memory storage with least-recently-used eviction.
///
/// Entries are kept in recency order: reads and writes move an entry to the
/// back, and when the store is full the front entry is evicted.
pub struct MemoryStorage<T> {
  entries: IndexMap<EntityId, T>,
  capacity: Option<NonZeroUsize>,
}

impl<T> MemoryStorage<T> {
  /// Storage that never evicts.
  pub fn unbounded() -> Self {
    Self {
      entries: IndexMap::new(),
      capacity: None,
    }
  }

  /// Storage holding at most `capacity` entries. Zero means unbounded.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      entries: IndexMap::new(),
      capacity: NonZeroUsize::new(capacity),
    }
  }

  pub fn capacity(&self) -> Option<usize> {
    self.capacity.map(NonZeroUsize::get)
  }

  fn touch(&mut self, idx: usize) {
    let last = self.entries.len() - 1;
    self.entries.move_index(idx, last);
  }
}

impl<T: Clone + Send> CacheStorage<T> for MemoryStorage<T> {
  fn get(&mut self, id: EntityId) -> Option<T> {
    let idx = self.entries.get_index_of(&id)?;
    self.touch(idx);
    self.entries.get(&id).cloned()
  }

  fn has(&self, id: EntityId) -> bool {
    self.entries.contains_key(&id)
  }

  fn set(&mut self, id: EntityId, value: T) {
    if let Some(idx) = self.entries.get_index_of(&id) {
      self.entries[idx] = value;
      self.touch(idx);
      return;
    }

    if let Some(capacity) = self.capacity {
      while self.entries.len() >= capacity.get() {
        self.entries.shift_remove_index(0);
      }
    }
    self.entries.insert(id, value);
  }

  fn remove(&mut self, id: EntityId) -> Option<T> {
    self.entries.shift_remove(&id)
  }

  fn clear(&mut self) {
    self.entries.clear();
  }

  fn len(&self) -> usize {
    self.entries.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_has() {
    let mut storage = MemoryStorage::unbounded();
    assert!(!storage.has(1));
    storage.set(1, "one");
    assert!(storage.has(1));
    assert_eq!(storage.get(1), Some("one"));
    assert_eq!(storage.get(2), None);
  }

  #[test]
  fn test_last_write_wins() {
    let mut storage = MemoryStorage::unbounded();
    storage.set(1, "old");
    storage.set(1, "new");
    assert_eq!(storage.len(), 1);
    assert_eq!(storage.get(1), Some("new"));
  }

  #[test]
  fn test_evicts_least_recently_used() {
    let mut storage = MemoryStorage::with_capacity(2);
    storage.set(1, "one");
    storage.set(2, "two");

    // Reading 1 makes 2 the eviction candidate
    storage.get(1);
    storage.set(3, "three");

    assert!(storage.has(1));
    assert!(!storage.has(2));
    assert!(storage.has(3));
    assert_eq!(storage.len(), 2);
  }

  #[test]
  fn test_zero_capacity_is_unbounded() {
    let mut storage = MemoryStorage::with_capacity(0);
    for id in 0..100 {
      storage.set(id, id);
    }
    assert_eq!(storage.capacity(), None);
    assert_eq!(storage.len(), 100);
  }

  #[test]
  fn test_noop_storage_never_hits() {
    let mut storage = NoopStorage;
    CacheStorage::<u32>::set(&mut storage, 1, 10);
    assert!(!CacheStorage::<u32>::has(&storage, 1));
    assert_eq!(CacheStorage::<u32>::get(&mut storage, 1), None);
  }
}
