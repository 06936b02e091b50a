//! Cache layer that orchestrates caching logic with network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::api::{ApiError, EntityId};

use super::storage::{CacheStorage, MemoryStorage, NoopStorage};
use super::traits::{CacheResult, Cacheable};

/// Above this many sequence stamps, stamps that can no longer reject a
/// pending response are dropped.
const APPLIED_PRUNE_THRESHOLD: usize = 1024;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

struct InFlight<T> {
  seq: u64,
  future: SharedFetch<T>,
}

struct CacheState<T> {
  storage: Box<dyn CacheStorage<T>>,
  in_flight: HashMap<EntityId, InFlight<T>>,
  /// Sequence number of the value currently held for each id
  applied: HashMap<EntityId, u64>,
  /// Callers still awaiting a response, by request sequence number.
  /// Includes requests detached by `invalidate`.
  waiting: BTreeMap<u64, usize>,
  /// Responses to requests issued before the last `clear` are not stored
  floor: u64,
  next_seq: u64,
}

impl<T: Cacheable> CacheState<T> {
  fn bump(&mut self) -> u64 {
    self.next_seq += 1;
    self.next_seq
  }

  /// Store `value` unless something newer has been applied since the request
  /// carrying `seq` was issued. Returns the value callers should see.
  fn apply(&mut self, id: EntityId, seq: u64, value: T) -> T {
    let current = self.applied.get(&id).copied().unwrap_or(self.floor);
    if seq < current {
      debug!(
        entity = T::entity_type(),
        id, seq, current, "discarding out-of-order response"
      );
      return self.storage.get(id).unwrap_or(value);
    }

    self.applied.insert(id, seq);
    self.storage.set(id, value.clone());
    self.prune_stamps();
    value
  }

  fn prune_stamps(&mut self) {
    if self.applied.len() <= APPLIED_PRUNE_THRESHOLD {
      return;
    }
    let storage = &self.storage;
    let in_flight = &self.in_flight;
    // A stamp newer than the oldest pending request may still have to reject it
    let oldest_waiting = self.waiting.keys().next().copied();
    self.applied.retain(|id, stamp| {
      storage.has(*id) || in_flight.contains_key(id) || oldest_waiting.is_some_and(|seq| *stamp > seq)
    });
  }

  fn wait(&mut self, seq: u64) {
    *self.waiting.entry(seq).or_insert(0) += 1;
  }

  fn unwait(&mut self, seq: u64) {
    if let Entry::Occupied(mut entry) = self.waiting.entry(seq) {
      *entry.get_mut() -= 1;
      if *entry.get() == 0 {
        entry.remove();
      }
    }
  }
}

/// Registration of one caller awaiting the request with `seq`.
///
/// Released under the lock once the response is handled, or on drop when
/// the caller gives up.
struct Waiter<T: Cacheable> {
  state: Arc<Mutex<CacheState<T>>>,
  seq: u64,
  armed: bool,
}

impl<T: Cacheable> Waiter<T> {
  fn release(mut self, state: &mut CacheState<T>) {
    self.armed = false;
    state.unwait(self.seq);
  }
}

impl<T: Cacheable> Drop for Waiter<T> {
  fn drop(&mut self) {
    if self.armed {
      let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
      state.unwait(self.seq);
    }
  }
}

/// Process-wide cache of entities keyed by id.
///
/// Cloning yields another handle to the same cache. Concurrent requests for
/// the same id share one network call, and a response is only applied if no
/// newer value (from a later request or a local write) has landed meanwhile.
pub struct EntityCache<T: Cacheable> {
  state: Arc<Mutex<CacheState<T>>>,
}

impl<T: Cacheable> EntityCache<T> {
  /// Create a new cache with the given storage backend.
  pub fn new(storage: impl CacheStorage<T> + 'static) -> Self {
    Self {
      state: Arc::new(Mutex::new(CacheState {
        storage: Box::new(storage),
        in_flight: HashMap::new(),
        applied: HashMap::new(),
        waiting: BTreeMap::new(),
        floor: 0,
        next_seq: 0,
      })),
    }
  }

  /// In-memory LRU cache; a capacity of zero never evicts.
  pub fn in_memory(capacity: usize) -> Self {
    Self::new(MemoryStorage::with_capacity(capacity))
  }

  /// A cache that stores nothing; every lookup goes to the network.
  pub fn disabled() -> Self {
    Self::new(NoopStorage)
  }

  fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read a cached value without fetching.
  pub fn peek(&self, id: EntityId) -> Option<T> {
    self.lock().storage.get(id)
  }

  pub fn contains(&self, id: EntityId) -> bool {
    self.lock().storage.has(id)
  }

  pub fn len(&self) -> usize {
    self.lock().storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of ids with a request currently in flight.
  pub fn in_flight(&self) -> usize {
    self.lock().in_flight.len()
  }

  /// Write a value produced locally (create/update response).
  ///
  /// Responses to requests issued before this call are discarded.
  pub fn put(&self, value: T) {
    let mut state = self.lock();
    let seq = state.bump();
    state.apply(value.cache_id(), seq, value);
  }

  /// Forget the cached value for `id`.
  ///
  /// Requests already in flight for `id` are detached: their responses will
  /// not be applied and the next fetch issues a new request.
  pub fn invalidate(&self, id: EntityId) {
    let mut state = self.lock();
    let seq = state.bump();
    state.applied.insert(id, seq);
    state.in_flight.remove(&id);
    state.storage.remove(id);
    trace!(entity = T::entity_type(), id, "invalidated");
  }

  pub fn clear(&self) {
    let mut state = self.lock();
    state.storage.clear();
    state.in_flight.clear();
    state.applied.clear();
    state.floor = state.bump();
  }

  /// Fetch a single entity with caching.
  ///
  /// 1. Cached value present - return it without a request
  /// 2. A request for `id` is already in flight - wait for that one
  /// 3. Otherwise call `fetcher` and store its result
  ///
  /// Failures are returned to every waiter and nothing is cached.
  pub async fn fetch_one<F, Fut>(&self, id: EntityId, fetcher: F) -> Result<CacheResult<T>, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (waiter, future) = {
      let mut state = self.lock();

      if let Some(hit) = state.storage.get(id) {
        trace!(entity = T::entity_type(), id, "cache hit");
        return Ok(CacheResult::from_cache(hit));
      }

      let (seq, future) = match state.in_flight.get(&id) {
        Some(pending) => {
          trace!(entity = T::entity_type(), id, "joining in-flight request");
          (pending.seq, pending.future.clone())
        }
        None => {
          let seq = state.bump();
          let future = fetcher().boxed().shared();
          state.in_flight.insert(
            id,
            InFlight {
              seq,
              future: future.clone(),
            },
          );
          trace!(entity = T::entity_type(), id, seq, "cache miss, fetching");
          (seq, future)
        }
      };

      state.wait(seq);
      let waiter = Waiter {
        state: Arc::clone(&self.state),
        seq,
        armed: true,
      };
      (waiter, future)
    };

    let result = future.await;

    let mut state = self.lock();
    let seq = waiter.seq;
    if state.in_flight.get(&id).is_some_and(|p| p.seq == seq) {
      state.in_flight.remove(&id);
    }

    let outcome = result.map(|value| CacheResult::from_network(state.apply(id, seq, value)));
    waiter.release(&mut state);
    outcome
  }
}

impl<T: Cacheable> Clone for EntityCache<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::oneshot;

  #[derive(Debug, Clone, PartialEq)]
  struct Item {
    id: EntityId,
    label: &'static str,
  }

  impl Cacheable for Item {
    fn cache_id(&self) -> EntityId {
      self.id
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  fn item(id: EntityId, label: &'static str) -> Item {
    Item { id, label }
  }

  #[tokio::test]
  async fn test_second_fetch_served_from_cache() {
    let cache = EntityCache::in_memory(0);
    let calls = Arc::new(AtomicUsize::new(0));

    for expected_source in [CacheSource::Network, CacheSource::Cache] {
      let calls = calls.clone();
      let result = cache
        .fetch_one(5, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(item(5, "five"))
        })
        .await
        .unwrap();
      assert_eq!(result.data, item(5, "five"));
      assert_eq!(result.source, expected_source);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_request() {
    let cache = EntityCache::in_memory(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));

    let mut handles = Vec::new();
    for _ in 0..3 {
      let cache = cache.clone();
      let calls = calls.clone();
      let gate = gate.clone();
      handles.push(tokio::spawn(async move {
        cache
          .fetch_one(1, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = gate.lock().unwrap().take();
            async move {
              if let Some(gate) = gate {
                let _ = gate.await;
              }
              Ok(item(1, "one"))
            }
          })
          .await
      }));
    }

    // Let every task register before the response arrives
    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
    release.send(()).unwrap();

    for handle in handles {
      let result = handle.await.unwrap().unwrap();
      assert_eq!(result.data, item(1, "one"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.in_flight(), 0);
  }

  #[tokio::test]
  async fn test_failure_is_not_cached() {
    let cache: EntityCache<Item> = EntityCache::in_memory(0);

    let err = cache
      .fetch_one(2, || async { Err(ApiError::Timeout) })
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Timeout);
    assert!(!cache.contains(2));

    let result = cache
      .fetch_one(2, || async { Ok(item(2, "two")) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_local_write_wins_over_older_response() {
    let cache = EntityCache::in_memory(0);
    let (release, gate) = oneshot::channel::<()>();

    let fetching = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch_one(3, move || async move {
            let _ = gate.await;
            Ok(item(3, "fetched before update"))
          })
          .await
      })
    };

    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }
    cache.put(item(3, "updated"));
    release.send(()).unwrap();

    let result = fetching.await.unwrap().unwrap();
    assert_eq!(result.data.label, "updated");
    assert_eq!(cache.peek(3).unwrap().label, "updated");
  }

  #[tokio::test]
  async fn test_out_of_order_responses_keep_newest() {
    let cache = EntityCache::in_memory(0);
    let (release_old, gate_old) = oneshot::channel::<()>();

    let old = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch_one(4, move || async move {
            let _ = gate_old.await;
            Ok(item(4, "old"))
          })
          .await
      })
    };
    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }

    // A refresh detaches the first request and issues a newer one
    cache.invalidate(4);
    let newer = cache
      .fetch_one(4, || async { Ok(item(4, "new")) })
      .await
      .unwrap();
    assert_eq!(newer.data.label, "new");

    release_old.send(()).unwrap();
    let stale = old.await.unwrap().unwrap();
    assert_eq!(stale.data.label, "new");
    assert_eq!(cache.peek(4).unwrap().label, "new");
  }

  #[tokio::test]
  async fn test_disabled_cache_always_fetches() {
    let cache = EntityCache::disabled();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
      let calls = calls.clone();
      cache
        .fetch_one(6, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(item(6, "six"))
        })
        .await
        .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn test_detached_response_stays_rejected_under_churn() {
    let cache = EntityCache::in_memory(2);
    let (release, gate) = oneshot::channel::<()>();

    let detached = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch_one(4, move || async move {
            let _ = gate.await;
            Ok(item(4, "before delete"))
          })
          .await
      })
    };
    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }

    cache.invalidate(4);
    // Enough writes to push the stamp table past its prune threshold
    for id in 10..1200 {
      cache.put(item(id, "filler"));
    }
    release.send(()).unwrap();

    detached.await.unwrap().unwrap();
    assert!(cache.peek(4).is_none());
    assert!(cache.lock().waiting.is_empty());
  }

  #[tokio::test]
  async fn test_responses_issued_before_clear_are_not_stored() {
    let cache = EntityCache::in_memory(0);
    let (release, gate) = oneshot::channel::<()>();

    let pending = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch_one(8, move || async move {
            let _ = gate.await;
            Ok(item(8, "stale"))
          })
          .await
      })
    };
    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }

    cache.clear();
    release.send(()).unwrap();
    pending.await.unwrap().unwrap();
    assert!(!cache.contains(8));
  }

  #[tokio::test]
  async fn test_abandoned_fetch_releases_its_registration() {
    let cache: EntityCache<Item> = EntityCache::in_memory(0);
    let waiting = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch_one(9, || futures::future::pending::<Result<Item, ApiError>>())
          .await
      })
    };
    while cache.in_flight() == 0 {
      tokio::task::yield_now().await;
    }
    assert_eq!(cache.lock().waiting.len(), 1);

    waiting.abort();
    let _ = waiting.await;
    assert!(cache.lock().waiting.is_empty());
  }

  #[test]
  fn test_lru_bound() {
    let cache = EntityCache::in_memory(2);
    cache.put(item(1, "a"));
    cache.put(item(2, "b"));
    cache.put(item(3, "c"));
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(1));
  }
}
