//! Binding between entity types and their REST endpoints.

use serde::{de::DeserializeOwned, Serialize};

use crate::cache::Cacheable;

use super::filters::{ListFilters, PropertyFilters, TenantFilters};
use super::types::{
  EntityId, Property, PropertyCreate, PropertyUpdate, Tenant, TenantCreate, TenantUpdate,
};

/// An entity served by a `/{PATH}` collection with the usual CRUD routes.
pub trait Resource: Cacheable + DeserializeOwned {
  /// Collection path segment, e.g. "properties"
  const PATH: &'static str;

  type Create: Serialize + Send + Sync;
  type Update: Serialize + Send + Sync;
  type Filters: ListFilters;

  /// Whether this entity no longer belongs in a list filtered by `filters`.
  fn excluded_by(&self, filters: &Self::Filters) -> bool;
}

impl Cacheable for Property {
  fn cache_id(&self) -> EntityId {
    self.id
  }

  fn entity_type() -> &'static str {
    "property"
  }
}

impl Resource for Property {
  const PATH: &'static str = "properties";

  type Create = PropertyCreate;
  type Update = PropertyUpdate;
  type Filters = PropertyFilters;

  fn excluded_by(&self, filters: &PropertyFilters) -> bool {
    filters.excludes(self)
  }
}

impl Cacheable for Tenant {
  fn cache_id(&self) -> EntityId {
    self.id
  }

  fn entity_type() -> &'static str {
    "tenant"
  }
}

impl Resource for Tenant {
  const PATH: &'static str = "tenants";

  type Create = TenantCreate;
  type Update = TenantUpdate;
  type Filters = TenantFilters;

  fn excluded_by(&self, filters: &TenantFilters) -> bool {
    filters.excludes(self)
  }
}
