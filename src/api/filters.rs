//! Typed list filters and their query-string form.

use sha2::{Digest, Sha256};
use std::fmt::Debug;

use super::types::{EntityId, Property, PropertyStatus, PropertyType, Tenant};

/// Filter state for one list endpoint.
///
/// A filter is changed one field at a time through `Field` values; setting a
/// field to `None` (or blank text) removes the constraint.
pub trait ListFilters: Clone + Default + Debug + PartialEq + Send + Sync + 'static {
  /// A single field assignment, e.g. `PropertyFilter::Search(Some("oak".into()))`
  type Field: Clone + Debug + Send + Sync + 'static;

  fn set(&mut self, field: Self::Field);

  /// Active constraints as query parameters. Unset fields are omitted.
  fn query_pairs(&self) -> Vec<(&'static str, String)>;

  /// Stable identity of the active constraints.
  ///
  /// Two filter values with the same constraints share an identity regardless
  /// of the order in which fields were set.
  fn identity(&self) -> String {
    let mut pairs = self.query_pairs();
    pairs.sort();

    let mut hasher = Sha256::new();
    for (key, value) in pairs {
      hasher.update(key.as_bytes());
      hasher.update(b"=");
      hasher.update(value.as_bytes());
      hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
  }

  /// The search text when it is the only active constraint.
  ///
  /// Such lists are served by the dedicated `/search` endpoint.
  fn search_only(&self) -> Option<String> {
    let mut pairs = self.query_pairs();
    match pairs.as_slice() {
      [("search", _)] => pairs.pop().map(|(_, term)| term),
      _ => None,
    }
  }
}

/// Normalize free text so blank input means "no constraint".
fn normalize_text(value: Option<String>) -> Option<String> {
  value
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilters {
  pub search: Option<String>,
  pub property_type: Option<PropertyType>,
  pub status: Option<PropertyStatus>,
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub min_bedrooms: Option<u32>,
  pub min_bathrooms: Option<u32>,
  pub parent_property_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyFilter {
  Search(Option<String>),
  Type(Option<PropertyType>),
  Status(Option<PropertyStatus>),
  MinPrice(Option<f64>),
  MaxPrice(Option<f64>),
  MinBedrooms(Option<u32>),
  MinBathrooms(Option<u32>),
  Parent(Option<EntityId>),
}

impl ListFilters for PropertyFilters {
  type Field = PropertyFilter;

  fn set(&mut self, field: PropertyFilter) {
    match field {
      PropertyFilter::Search(v) => self.search = normalize_text(v),
      PropertyFilter::Type(v) => self.property_type = v,
      PropertyFilter::Status(v) => self.status = v,
      PropertyFilter::MinPrice(v) => self.min_price = v,
      PropertyFilter::MaxPrice(v) => self.max_price = v,
      PropertyFilter::MinBedrooms(v) => self.min_bedrooms = v,
      PropertyFilter::MinBathrooms(v) => self.min_bathrooms = v,
      PropertyFilter::Parent(v) => self.parent_property_id = v,
    }
  }

  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(search) = &self.search {
      pairs.push(("search", search.clone()));
    }
    if let Some(t) = self.property_type {
      pairs.push(("property_type", t.as_str().to_string()));
    }
    if let Some(s) = self.status {
      pairs.push(("status", s.as_str().to_string()));
    }
    if let Some(v) = self.min_price {
      pairs.push(("min_price", v.to_string()));
    }
    if let Some(v) = self.max_price {
      pairs.push(("max_price", v.to_string()));
    }
    if let Some(v) = self.min_bedrooms {
      pairs.push(("min_bedrooms", v.to_string()));
    }
    if let Some(v) = self.min_bathrooms {
      pairs.push(("min_bathrooms", v.to_string()));
    }
    if let Some(v) = self.parent_property_id {
      pairs.push(("parent_property_id", v.to_string()));
    }
    pairs
  }
}

impl PropertyFilters {
  /// True when `property` fails a constraint that can be checked locally.
  ///
  /// Search text is matched by the server and is not evaluated here, nor is
  /// a bound on a field the property leaves empty.
  pub fn excludes(&self, property: &Property) -> bool {
    let below = |min: Option<f64>, value: Option<f64>| matches!((min, value), (Some(min), Some(v)) if v < min);
    let above = |max: Option<f64>, value: Option<f64>| matches!((max, value), (Some(max), Some(v)) if v > max);

    self.property_type.is_some_and(|t| t != property.property_type)
      || self.status.is_some_and(|s| s != property.status)
      || self
        .parent_property_id
        .is_some_and(|id| property.parent_property_id != Some(id))
      || below(self.min_price, property.monthly_rent)
      || above(self.max_price, property.monthly_rent)
      || below(self.min_bedrooms.map(f64::from), property.bedrooms.map(f64::from))
      || below(self.min_bathrooms.map(f64::from), property.bathrooms.map(f64::from))
  }
}

impl TenantFilters {
  /// True when `tenant` belongs to a different property than the one
  /// filtered on.
  pub fn excludes(&self, tenant: &Tenant) -> bool {
    self.property_id.is_some_and(|id| id != tenant.property_id)
  }
}
