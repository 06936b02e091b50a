//! Serde types matching the rental API's JSON payloads.
//!
//! Response types are lenient (optional fields default, legacy field names are
//! accepted as aliases) while request payloads carry exactly the canonical
//! create/update contract.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Integer identifier shared by every entity kind.
pub type EntityId = i64;

// ============================================================================
// Enumerations
// ============================================================================

/// Discriminator between top-level properties and the units they contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
  #[default]
  #[serde(rename = "PRINCIPAL", alias = "MAIN", alias = "Main")]
  Principal,
  #[serde(rename = "UNIT", alias = "Unit")]
  Unit,
}

impl PropertyType {
  pub fn as_str(&self) -> &'static str {
    match self {
      PropertyType::Principal => "PRINCIPAL",
      PropertyType::Unit => "UNIT",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      PropertyType::Principal => "Principal",
      PropertyType::Unit => "Unit",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      PropertyType::Principal => PropertyType::Unit,
      PropertyType::Unit => PropertyType::Principal,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
  #[default]
  Available,
  Rented,
  Maintenance,
  #[serde(alias = "inactive")]
  Unavailable,
}

impl PropertyStatus {
  pub const ALL: [PropertyStatus; 4] = [
    PropertyStatus::Available,
    PropertyStatus::Rented,
    PropertyStatus::Maintenance,
    PropertyStatus::Unavailable,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      PropertyStatus::Available => "available",
      PropertyStatus::Rented => "rented",
      PropertyStatus::Maintenance => "maintenance",
      PropertyStatus::Unavailable => "unavailable",
    }
  }

  /// The next status in display order, wrapping around.
  pub fn next(self) -> Self {
    let idx = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
    Self::ALL[(idx + 1) % Self::ALL.len()]
  }
}

impl fmt::Display for PropertyStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Properties
// ============================================================================

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub id: EntityId,
  #[serde(default, alias = "title")]
  pub name: Option<String>,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub city: Option<String>,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub zip_code: Option<String>,
  #[serde(default)]
  pub bedrooms: Option<u32>,
  #[serde(default)]
  pub bathrooms: Option<f32>,
  #[serde(default, alias = "area")]
  pub square_feet: Option<f64>,
  #[serde(default)]
  pub status: PropertyStatus,
  #[serde(default = "default_true")]
  pub is_active: bool,
  #[serde(default)]
  pub property_type: PropertyType,
  #[serde(default, alias = "parent_id")]
  pub parent_property_id: Option<EntityId>,
  #[serde(default, alias = "price", deserialize_with = "de_opt_amount")]
  pub monthly_rent: Option<f64>,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl Property {
  /// Name for display, falling back to the street address.
  pub fn display_name(&self) -> &str {
    match self.name.as_deref() {
      Some(name) if !name.trim().is_empty() => name,
      _ => &self.address,
    }
  }

  pub fn is_unit(&self) -> bool {
    self.property_type == PropertyType::Unit
  }

  /// "street, city, state zip" with missing parts skipped.
  pub fn full_address(&self) -> String {
    let mut out = self.address.clone();
    if let Some(city) = self.city.as_deref().filter(|c| !c.is_empty()) {
      out.push_str(", ");
      out.push_str(city);
    }
    let tail: Vec<&str> = [self.state.as_deref(), self.zip_code.as_deref()]
      .into_iter()
      .flatten()
      .filter(|s| !s.is_empty())
      .collect();
    if !tail.is_empty() {
      out.push_str(", ");
      out.push_str(&tail.join(" "));
    }
    out
  }
}

/// Canonical create payload for `POST /properties`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyCreate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub address: String,
  pub city: String,
  pub state: String,
  pub zip_code: String,
  pub property_type: PropertyType,
  pub bedrooms: u32,
  pub bathrooms: u32,
  pub status: PropertyStatus,
  pub is_active: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_property_id: Option<EntityId>,
}

/// Partial update payload for `PUT /properties/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub zip_code: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bedrooms: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bathrooms: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<PropertyStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

// ============================================================================
// Tenants
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
  pub id: EntityId,
  pub first_name: String,
  pub last_name: String,
  pub property_id: EntityId,
  pub lease_start: NaiveDate,
  pub lease_end: NaiveDate,
  #[serde(deserialize_with = "de_amount")]
  pub monthly_rent: f64,
  #[serde(deserialize_with = "de_amount")]
  pub deposit: f64,
  pub payment_day: u8,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl Tenant {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

/// Create payload for `POST /tenants`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantCreate {
  pub first_name: String,
  pub last_name: String,
  pub property_id: EntityId,
  pub lease_start: NaiveDate,
  pub lease_end: NaiveDate,
  pub monthly_rent: f64,
  pub deposit: f64,
  pub payment_day: u8,
}

/// Partial update payload for `PUT /tenants/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TenantUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub property_id: Option<EntityId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lease_start: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lease_end: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub monthly_rent: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deposit: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payment_day: Option<u8>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Money amounts arrive as JSON numbers or as decimal strings ("1200.00").
#[derive(Deserialize)]
#[serde(untagged)]
enum Amount {
  Number(f64),
  Text(String),
}

impl Amount {
  fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
    match self {
      Amount::Number(n) => Ok(n),
      Amount::Text(s) => s
        .trim()
        .parse::<f64>()
        .map_err(|_| E::custom(format!("invalid amount '{}'", s))),
    }
  }
}

fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  Amount::deserialize(deserializer)?.into_f64()
}

fn de_opt_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  Option::<Amount>::deserialize(deserializer)?
    .map(Amount::into_f64)
    .transpose()
}
