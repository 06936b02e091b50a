use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use crate::api::{ApiClient, ApiError, EntityId, Resource};
use crate::cache::{Cacheable, EntityCache};
use crate::query::{Query, QueryError};
use crate::telemetry::ErrorReporter;

/// A change made through a detail or form view.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent<T> {
  Created(T),
  Updated(T),
  Deleted(EntityId),
}

/// Fan-out of mutation events to every open list.
///
/// Subscribers that fall behind skip the oldest events.
#[derive(Debug, Clone)]
pub struct MutationBus<T> {
  tx: broadcast::Sender<MutationEvent<T>>,
}

impl<T: Cacheable> MutationBus<T> {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  pub fn publish(&self, event: MutationEvent<T>) {
    // No subscribers is fine: no list is open
    let receivers = self.tx.send(event).unwrap_or(0);
    trace!(entity = T::entity_type(), receivers, "mutation published");
  }

  pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent<T>> {
    self.tx.subscribe()
  }
}

impl<T: Cacheable> Default for MutationBus<T> {
  fn default() -> Self {
    Self::new(64)
  }
}

/// Create, update and delete for one resource.
///
/// Each call starts immediately and returns a handle to poll. Successful
/// writes land in the cache and are published on the bus before the handle
/// reports success. Failed writes are reported to telemetry.
pub struct EntityWriter<R: Resource> {
  api: ApiClient,
  cache: EntityCache<R>,
  bus: MutationBus<R>,
  reporter: ErrorReporter,
}

impl<R: Resource> Clone for EntityWriter<R> {
  fn clone(&self) -> Self {
    Self {
      api: self.api.clone(),
      cache: self.cache.clone(),
      bus: self.bus.clone(),
      reporter: self.reporter.clone(),
    }
  }
}

impl<R> EntityWriter<R>
where
  R: Resource,
  R::Create: Clone,
  R::Update: Clone,
{
  pub fn new(api: ApiClient, cache: EntityCache<R>, bus: MutationBus<R>) -> Self {
    Self {
      api,
      cache,
      bus,
      reporter: ErrorReporter::disabled(),
    }
  }

  pub fn reporting_to(mut self, reporter: &ErrorReporter) -> Self {
    self.reporter = reporter.clone();
    self
  }

  pub fn create(&self, payload: R::Create) -> Query<R> {
    let writer = self.clone();
    let mut query = Query::new(move || {
      let writer = writer.clone();
      let payload = payload.clone();
      async move {
        let created = writer
          .api
          .create::<R>(&payload)
          .await
          .map_err(|e| writer.failed("create", None, e))?;
        info!(entity = R::entity_type(), id = created.cache_id(), "created");
        writer.cache.put(created.clone());
        writer.bus.publish(MutationEvent::Created(created.clone()));
        Ok::<_, QueryError>(created)
      }
    });
    query.fetch();
    query
  }

  pub fn update(&self, id: EntityId, payload: R::Update) -> Query<R> {
    let writer = self.clone();
    let mut query = Query::new(move || {
      let writer = writer.clone();
      let payload = payload.clone();
      async move {
        let updated = writer
          .api
          .update::<R>(id, &payload)
          .await
          .map_err(|e| writer.failed("update", Some(id), e))?;
        info!(entity = R::entity_type(), id, "updated");
        writer.cache.put(updated.clone());
        writer.bus.publish(MutationEvent::Updated(updated.clone()));
        Ok::<_, QueryError>(updated)
      }
    });
    query.fetch();
    query
  }

  pub fn delete(&self, id: EntityId) -> Query<EntityId> {
    let writer = self.clone();
    let mut query = Query::new(move || {
      let writer = writer.clone();
      async move {
        writer
          .api
          .delete::<R>(id)
          .await
          .map_err(|e| writer.failed("delete", Some(id), e))?;
        info!(entity = R::entity_type(), id, "deleted");
        writer.cache.invalidate(id);
        writer.bus.publish(MutationEvent::Deleted(id));
        Ok::<_, QueryError>(id)
      }
    });
    query.fetch();
    query
  }

  fn failed(&self, action: &str, id: Option<EntityId>, source: ApiError) -> QueryError {
    warn!(entity = R::entity_type(), action, ?id, error = %source, "write failed");
    let error = QueryError::failed(action, R::entity_type(), source);
    self
      .reporter
      .capture_error(&format!("{}.{}", R::entity_type(), action), &error);
    error
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{Property, PropertyCreate, PropertyStatus, PropertyType};
  use crate::api::PropertyUpdate;
  use crate::data::entity::tests::{client_for, poll_until};
  use crate::telemetry::tests::{reporter_for, wait_for_requests};
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn writer_for(server: &MockServer) -> (EntityWriter<Property>, EntityCache<Property>, MutationBus<Property>) {
    let cache = EntityCache::in_memory(0);
    let bus = MutationBus::default();
    let writer = EntityWriter::new(client_for(server), cache.clone(), bus.clone());
    (writer, cache, bus)
  }

  async fn settle<T: Send + 'static>(query: &mut Query<T>) {
    poll_until(query, |q| {
      q.poll();
      !q.is_loading()
    })
    .await;
  }

  #[tokio::test]
  async fn test_create_caches_and_publishes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": 10, "name": "Oak Court", "address": "1 Oak St"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let (writer, cache, bus) = writer_for(&server);
    let mut events = bus.subscribe();

    let mut query = writer.create(PropertyCreate {
      name: Some("Oak Court".into()),
      address: "1 Oak St".into(),
      city: "Springfield".into(),
      state: "IL".into(),
      zip_code: "62701".into(),
      property_type: PropertyType::Principal,
      bedrooms: 0,
      bathrooms: 0,
      status: PropertyStatus::Available,
      is_active: true,
      parent_property_id: None,
    });
    settle(&mut query).await;

    assert_eq!(query.data().map(|p| p.id), Some(10));
    assert!(cache.contains(10));
    assert!(matches!(events.try_recv(), Ok(MutationEvent::Created(p)) if p.id == 10));
  }

  #[tokio::test]
  async fn test_failed_delete_keeps_cache() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/api/v1/properties/3"))
      .respond_with(ResponseTemplate::new(409).set_body_json(json!({"detail": "Property has tenants"})))
      .mount(&server)
      .await;

    let (writer, cache, bus) = writer_for(&server);
    let mut events = bus.subscribe();
    cache.put(serde_json::from_value(json!({"id": 3, "address": "3 Elm St"})).unwrap());

    let mut query = writer.delete(3);
    settle(&mut query).await;

    assert_eq!(
      query.error().map(ToString::to_string).as_deref(),
      Some("Failed to delete property: Property has tenants")
    );
    assert!(cache.contains(3));
    assert!(events.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_delete_publishes_and_invalidates() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/api/v1/properties/3"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let (writer, cache, bus) = writer_for(&server);
    let mut events = bus.subscribe();
    cache.put(serde_json::from_value(json!({"id": 3, "address": "3 Elm St"})).unwrap());

    let mut query = writer.delete(3);
    settle(&mut query).await;

    assert_eq!(query.data(), Some(&3));
    assert!(!cache.contains(3));
    assert_eq!(events.try_recv().unwrap(), MutationEvent::Deleted(3));
  }

  #[tokio::test]
  async fn test_failed_update_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/api/v1/properties/8"))
      .respond_with(ResponseTemplate::new(422).set_body_json(json!({
        "detail": [{"msg": "rent must be positive"}]
      })))
      .mount(&server)
      .await;
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/events"))
      .respond_with(ResponseTemplate::new(202))
      .mount(&collector)
      .await;

    let (writer, _cache, _bus) = writer_for(&server);
    let writer = writer.reporting_to(&reporter_for(&collector));
    let mut query = writer.update(8, PropertyUpdate::default());
    settle(&mut query).await;

    let error = query.error().unwrap();
    assert_eq!(error.to_string(), "Failed to update property: rent must be positive");
    assert!(matches!(error.api_error(), ApiError::Status { status: 422, .. }));

    let events = wait_for_requests(&collector, 1).await;
    assert_eq!(events.len(), 1);
    let body: serde_json::Value = events[0].body_json().unwrap();
    assert_eq!(body["kind"], "property.update");
    assert_eq!(body["severity"], "error");
  }
}
