use futures::future::{BoxFuture, FutureExt};
use tracing::warn;

use crate::api::{ApiClient, EntityId, Resource};
use crate::cache::EntityCache;
use crate::query::{Query, QueryError, QueryResult};
use crate::telemetry::ErrorReporter;

/// Pollable handle on one entity, read through the shared cache.
///
/// Constructed with `None` the handle is inert: it never fetches and reports
/// no entity, no error and not loading. With a cached id it starts populated;
/// otherwise it starts loading and the fetch runs on the runtime.
pub struct EntityQuery<T: Resource> {
  id: Option<EntityId>,
  cache: EntityCache<T>,
  query: Option<Query<T>>,
  reporter: ErrorReporter,
}

impl<T: Resource> EntityQuery<T> {
  pub fn new(id: Option<EntityId>, api: &ApiClient, cache: &EntityCache<T>) -> Self {
    let query = id.map(|id| {
      let query = Query::new(load_through_cache(id, api.clone(), cache.clone()));
      match cache.peek(id) {
        Some(hit) => query.with_data(hit),
        None => {
          let mut query = query;
          query.fetch();
          query
        }
      }
    });

    Self {
      id,
      cache: cache.clone(),
      query,
      reporter: ErrorReporter::disabled(),
    }
  }

  /// Forward load failures to `reporter`.
  pub fn reporting_to(mut self, reporter: &ErrorReporter) -> Self {
    self.reporter = reporter.clone();
    self
  }

  pub fn id(&self) -> Option<EntityId> {
    self.id
  }

  pub fn entity(&self) -> Option<&T> {
    self.query.as_ref().and_then(Query::data)
  }

  pub fn is_loading(&self) -> bool {
    self.query.as_ref().is_some_and(Query::is_loading)
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.query.as_ref().and_then(Query::error)
  }

  /// Returns true when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(query) = self.query.as_mut() else {
      return false;
    };
    if !query.poll() {
      return false;
    }
    if let Some(e) = query.error() {
      let kind = format!("{}.load", T::entity_type());
      self.reporter.capture_error(&kind, e);
    }
    true
  }

  /// Drop the cached value and fetch again.
  pub fn refetch(&mut self) {
    if let (Some(id), Some(query)) = (self.id, self.query.as_mut()) {
      self.cache.invalidate(id);
      query.refetch();
    }
  }

  /// Apply a value returned by a mutation to both the handle and the cache.
  pub fn set_entity(&mut self, value: T) {
    if let Some(query) = self.query.as_mut() {
      self.cache.put(value.clone());
      query.set_data(value);
    }
  }
}

fn load_through_cache<T: Resource>(
  id: EntityId,
  api: ApiClient,
  cache: EntityCache<T>,
) -> impl Fn() -> BoxFuture<'static, QueryResult<T>> + Send + Sync + 'static {
  move || {
    let api = api.clone();
    let cache = cache.clone();
    async move {
      cache
        .fetch_one(id, move || async move { api.get::<T>(id).await })
        .await
        .map(|result| result.data)
        .map_err(|e| {
          warn!(entity = T::entity_type(), id, error = %e, "entity fetch failed");
          QueryError::failed("load", T::entity_type(), e)
        })
    }
    .boxed()
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::api::Property;
  use crate::config::ApiConfig;
  use crate::telemetry::tests::{reporter_for, wait_for_requests};
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  pub(crate) fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiConfig {
      base_url: server.uri(),
      list_timeout_secs: 5,
    })
    .unwrap()
  }

  /// Poll until the closure reports done or about a second has passed.
  pub(crate) async fn poll_until<Q>(handle: &mut Q, mut poll: impl FnMut(&mut Q) -> bool) {
    for _ in 0..200 {
      if poll(handle) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }

  async fn settle<T: Resource>(query: &mut EntityQuery<T>) {
    poll_until(query, |q| {
      q.poll();
      !q.is_loading()
    })
    .await;
  }

  #[tokio::test]
  async fn test_none_id_is_inert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let cache = EntityCache::<Property>::in_memory(0);
    let mut query = EntityQuery::new(None, &client_for(&server), &cache);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!query.poll());
    assert!(!query.is_loading());
    assert!(query.entity().is_none());
    assert!(query.error().is_none());
  }

  #[tokio::test]
  async fn test_miss_loads_then_hit_is_synchronous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 1,
        "title": "Test Property",
        "address": "123 Test St",
        "price": 1000,
        "status": "available"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let api = client_for(&server);
    let cache = EntityCache::<Property>::in_memory(0);

    let mut first = EntityQuery::new(Some(1), &api, &cache);
    assert!(first.is_loading());
    settle(&mut first).await;
    assert_eq!(first.entity().unwrap().display_name(), "Test Property");

    let second = EntityQuery::new(Some(1), &api, &cache);
    assert!(!second.is_loading());
    assert_eq!(second.entity().unwrap().monthly_rent, Some(1000.0));
  }

  #[tokio::test]
  async fn test_failure_sets_message_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/9"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Property not found"})))
      .expect(1)
      .mount(&server)
      .await;

    let cache = EntityCache::<Property>::in_memory(0);
    let mut query = EntityQuery::new(Some(9), &client_for(&server), &cache);
    settle(&mut query).await;

    let error = query.error().unwrap();
    assert!(error.is_not_found());
    assert_eq!(error.to_string(), "Failed to load property: not found");
    assert!(query.entity().is_none());

    // Further polling never issues another request
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!query.poll());
  }

  #[tokio::test]
  async fn test_failed_load_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/4"))
      .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "database unavailable"})))
      .mount(&server)
      .await;
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/events"))
      .respond_with(ResponseTemplate::new(202))
      .mount(&collector)
      .await;

    let cache = EntityCache::<Property>::in_memory(0);
    let mut query =
      EntityQuery::new(Some(4), &client_for(&server), &cache).reporting_to(&reporter_for(&collector));
    settle(&mut query).await;
    assert!(query.error().is_some());

    let events = wait_for_requests(&collector, 1).await;
    assert_eq!(events.len(), 1);
    let body: serde_json::Value = events[0].body_json().unwrap();
    assert_eq!(body["kind"], "property.load");
    assert_eq!(body["message"], "Failed to load property: database unavailable");
    assert_eq!(body["extra"]["causes"][0], "server returned 500: database unavailable");
  }

  #[tokio::test]
  async fn test_refetch_bypasses_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "address": "2 Oak Ave"})))
      .expect(2)
      .mount(&server)
      .await;

    let cache = EntityCache::<Property>::in_memory(0);
    let mut query = EntityQuery::new(Some(2), &client_for(&server), &cache);
    settle(&mut query).await;

    query.refetch();
    assert!(query.is_loading());
    settle(&mut query).await;
    assert_eq!(query.entity().unwrap().address, "2 Oak Ave");
  }
}
