use tracing::warn;

use crate::api::{ApiClient, EntityId, Property, PropertyType};
use crate::cache::EntityCache;
use crate::query::QueryError;
use crate::telemetry::ErrorReporter;

use super::entity::EntityQuery;

/// Resolves the parent of a unit.
///
/// Anything that is not a unit with a parent id resolves to nothing without
/// touching the network.
pub struct ParentQuery {
  inner: EntityQuery<Property>,
}

impl ParentQuery {
  pub fn new(
    parent_id: Option<EntityId>,
    property_type: PropertyType,
    api: &ApiClient,
    cache: &EntityCache<Property>,
  ) -> Self {
    let id = match property_type {
      PropertyType::Unit => parent_id,
      PropertyType::Principal => None,
    };
    Self {
      inner: EntityQuery::new(id, api, cache),
    }
  }

  pub fn for_property(
    property: &Property,
    api: &ApiClient,
    cache: &EntityCache<Property>,
  ) -> Self {
    Self::new(
      property.parent_property_id,
      property.property_type,
      api,
      cache,
    )
  }

  pub fn reporting_to(self, reporter: &ErrorReporter) -> Self {
    Self {
      inner: self.inner.reporting_to(reporter),
    }
  }

  /// Id being resolved, if any.
  pub fn parent_id(&self) -> Option<EntityId> {
    self.inner.id()
  }

  pub fn parent(&self) -> Option<&Property> {
    self.inner.entity()
  }

  pub fn is_loading(&self) -> bool {
    self.inner.is_loading()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.inner.error()
  }

  pub fn poll(&mut self) -> bool {
    self.inner.poll()
  }
}

/// A property together with its parent when it is a unit.
///
/// A parent that fails to load is reported separately and never turns the
/// property itself into an error.
pub struct PropertyWithParent {
  api: ApiClient,
  cache: EntityCache<Property>,
  reporter: ErrorReporter,
  property: EntityQuery<Property>,
  parent: ParentQuery,
}

impl PropertyWithParent {
  pub fn new(id: EntityId, api: &ApiClient, cache: &EntityCache<Property>) -> Self {
    let property = EntityQuery::new(Some(id), api, cache);
    let parent = match property.entity() {
      Some(p) => ParentQuery::for_property(p, api, cache),
      None => ParentQuery::new(None, PropertyType::Principal, api, cache),
    };

    Self {
      api: api.clone(),
      cache: cache.clone(),
      reporter: ErrorReporter::disabled(),
      property,
      parent,
    }
  }

  /// Forward failures of both loads to `reporter`.
  pub fn reporting_to(self, reporter: &ErrorReporter) -> Self {
    Self {
      reporter: reporter.clone(),
      property: self.property.reporting_to(reporter),
      parent: self.parent.reporting_to(reporter),
      ..self
    }
  }

  pub fn property(&self) -> Option<&Property> {
    self.property.entity()
  }

  pub fn parent(&self) -> Option<&Property> {
    self.parent.parent()
  }

  pub fn is_loading(&self) -> bool {
    self.property.is_loading()
  }

  pub fn is_parent_loading(&self) -> bool {
    self.parent.is_loading()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.property.error()
  }

  pub fn parent_error(&self) -> Option<&QueryError> {
    self.parent.error()
  }

  /// Returns true when either the property or its parent changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.property.poll();
    if changed {
      self.sync_parent();
    }

    if self.parent.poll() {
      changed = true;
      if let Some(e) = self.parent.error() {
        warn!(parent_id = ?self.parent.parent_id(), error = %e, "parent property failed to load");
      }
    }
    changed
  }

  pub fn refetch(&mut self) {
    self.property.refetch();
  }

  /// Show a property returned by an update, re-resolving its parent if the
  /// link changed.
  pub fn set_property(&mut self, property: Property) {
    self.property.set_entity(property);
    self.sync_parent();
  }

  fn sync_parent(&mut self) {
    let Some(property) = self.property.entity() else {
      return;
    };

    let wanted = match property.property_type {
      PropertyType::Unit => property.parent_property_id,
      PropertyType::Principal => None,
    };
    if wanted != self.parent.parent_id() {
      self.parent =
        ParentQuery::for_property(property, &self.api, &self.cache).reporting_to(&self.reporter);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::entity::tests::{client_for, poll_until};
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_principal_never_fetches_parent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let cache = EntityCache::in_memory(0);
    let mut query = ParentQuery::new(Some(1), PropertyType::Principal, &client_for(&server), &cache);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(!query.poll());
    assert!(!query.is_loading());
    assert!(query.parent().is_none());
  }

  #[tokio::test]
  async fn test_unit_without_parent_id_is_noop() {
    let server = MockServer::start().await;
    let cache = EntityCache::in_memory(0);
    let query = ParentQuery::new(None, PropertyType::Unit, &client_for(&server), &cache);
    assert!(!query.is_loading());
    assert_eq!(query.parent_id(), None);
  }

  #[tokio::test]
  async fn test_unit_parent_lands_in_shared_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 1, "name": "Oak Court", "address": "1 Oak St", "property_type": "PRINCIPAL"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let api = client_for(&server);
    let cache = EntityCache::in_memory(0);
    let mut query = ParentQuery::new(Some(1), PropertyType::Unit, &api, &cache);
    assert!(query.is_loading());

    poll_until(&mut query, |q| {
      q.poll();
      !q.is_loading()
    })
    .await;

    assert_eq!(query.parent().unwrap().display_name(), "Oak Court");
    assert!(cache.contains(1));
  }

  #[tokio::test]
  async fn test_parent_failure_is_separate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 7, "name": "Unit 2B", "address": "1 Oak St",
        "property_type": "UNIT", "parent_property_id": 1
      })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/1"))
      .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
      .mount(&server)
      .await;

    let cache = EntityCache::in_memory(0);
    let mut query = PropertyWithParent::new(7, &client_for(&server), &cache);

    poll_until(&mut query, |q| {
      q.poll();
      !q.is_loading() && q.property().is_some() && !q.is_parent_loading()
    })
    .await;

    assert_eq!(query.property().unwrap().display_name(), "Unit 2B");
    assert!(query.error().is_none());
    let parent_error = query.parent_error().unwrap();
    assert_eq!(parent_error.to_string(), "Failed to load property: boom");
    assert!(!parent_error.is_not_found());
    assert!(query.parent().is_none());
  }
}
