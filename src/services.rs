//! Shared handles passed to every view.

use crate::api::{ApiClient, ApiError, Property, Tenant};
use crate::cache::{Cacheable, EntityCache};
use crate::config::{CacheConfig, Config};
use crate::data::{EntityWriter, ListSettings, MutationBus};
use crate::telemetry::ErrorReporter;

/// Everything a view needs to talk to the API.
///
/// Cloning is cheap; clones share the same caches and buses.
#[derive(Clone)]
pub struct Services {
  pub api: ApiClient,
  pub properties: EntityCache<Property>,
  pub tenants: EntityCache<Tenant>,
  pub property_events: MutationBus<Property>,
  pub tenant_events: MutationBus<Tenant>,
  pub lists: ListSettings,
  pub reporter: ErrorReporter,
  pub title: String,
}

impl Services {
  pub fn new(config: &Config, reporter: ErrorReporter) -> Result<Self, ApiError> {
    let api = ApiClient::new(&config.api)?;

    Ok(Self {
      api,
      properties: entity_cache(&config.cache),
      tenants: entity_cache(&config.cache),
      property_events: MutationBus::default(),
      tenant_events: MutationBus::default(),
      lists: ListSettings::from(&config.lists),
      reporter,
      title: config.display_title(),
    })
  }

  pub fn property_writer(&self) -> EntityWriter<Property> {
    EntityWriter::new(
      self.api.clone(),
      self.properties.clone(),
      self.property_events.clone(),
    )
    .reporting_to(&self.reporter)
  }

  pub fn tenant_writer(&self) -> EntityWriter<Tenant> {
    EntityWriter::new(
      self.api.clone(),
      self.tenants.clone(),
      self.tenant_events.clone(),
    )
    .reporting_to(&self.reporter)
  }
}

fn entity_cache<T: Cacheable>(config: &CacheConfig) -> EntityCache<T> {
  if config.enabled {
    EntityCache::in_memory(config.capacity)
  } else {
    EntityCache::disabled()
  }
}
