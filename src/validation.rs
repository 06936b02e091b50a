//! Form drafts and their validation into API payloads.
//!
//! Drafts hold raw text exactly as typed. Validation never panics: it either
//! produces the payload or every field error found.

use chrono::NaiveDate;
use thiserror::Error;

use crate::api::{
  EntityId, Property, PropertyCreate, PropertyStatus, PropertyType, PropertyUpdate, Tenant,
  TenantCreate, TenantUpdate,
};

const MAX_ROOMS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub path: &'static str,
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", summarize(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
  errors
    .iter()
    .map(|e| format!("{}: {}", e.path, e.message))
    .collect::<Vec<_>>()
    .join("; ")
}

impl ValidationErrors {
  fn push(&mut self, path: &'static str, message: impl Into<String>) {
    self.0.push(FieldError {
      path,
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// First message for a field, if it failed.
  pub fn get(&self, path: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|e| e.path == path)
      .map(|e| e.message.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
    self.0.iter()
  }

  fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
    if self.is_empty() {
      Ok(value())
    } else {
      Err(self)
    }
  }
}

fn required(errors: &mut ValidationErrors, path: &'static str, label: &str, value: &str) -> String {
  let value = value.trim();
  if value.is_empty() {
    errors.push(path, format!("{} is required", label));
  }
  value.to_string()
}

fn is_zip_code(value: &str) -> bool {
  let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
  match value.split_once('-') {
    Some((head, tail)) => digits(head, 5) && digits(tail, 4),
    None => digits(value, 5),
  }
}

fn room_count(errors: &mut ValidationErrors, path: &'static str, label: &str, value: &str) -> u32 {
  let value = value.trim();
  if value.is_empty() {
    return 0;
  }
  match value.parse::<u32>() {
    Ok(n) if n <= MAX_ROOMS => n,
    _ => {
      errors.push(
        path,
        format!("{} must be a whole number between 0 and {}", label, MAX_ROOMS),
      );
      0
    }
  }
}

fn positive_id(errors: &mut ValidationErrors, path: &'static str, label: &str, value: &str) -> Option<EntityId> {
  let value = value.trim();
  if value.is_empty() {
    errors.push(path, format!("{} is required", label));
    return None;
  }
  match value.parse::<EntityId>() {
    Ok(id) if id > 0 => Some(id),
    _ => {
      errors.push(path, format!("{} must be a positive number", label));
      None
    }
  }
}

fn amount(errors: &mut ValidationErrors, path: &'static str, label: &str, value: &str) -> f64 {
  let value = value.trim().trim_start_matches('$').replace(',', "");
  if value.is_empty() {
    errors.push(path, format!("{} is required", label));
    return 0.0;
  }
  match value.parse::<f64>() {
    Ok(n) if n.is_finite() && n >= 0.0 => n,
    _ => {
      errors.push(path, format!("{} must be a non-negative amount", label));
      0.0
    }
  }
}

fn date(errors: &mut ValidationErrors, path: &'static str, label: &str, value: &str) -> Option<NaiveDate> {
  let value = value.trim();
  if value.is_empty() {
    errors.push(path, format!("{} is required", label));
    return None;
  }
  match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
    Ok(d) => Some(d),
    Err(_) => {
      errors.push(path, format!("{} must be a date (YYYY-MM-DD)", label));
      None
    }
  }
}

// ============================================================================
// Properties
// ============================================================================

/// Property form contents.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDraft {
  pub property_type: PropertyType,
  pub name: String,
  pub address: String,
  pub city: String,
  pub state: String,
  pub zip_code: String,
  pub bedrooms: String,
  pub bathrooms: String,
  pub parent_property_id: String,
  pub status: PropertyStatus,
  pub is_active: bool,
}

impl Default for PropertyDraft {
  fn default() -> Self {
    Self {
      property_type: PropertyType::Principal,
      name: String::new(),
      address: String::new(),
      city: String::new(),
      state: String::new(),
      zip_code: String::new(),
      bedrooms: String::new(),
      bathrooms: String::new(),
      parent_property_id: String::new(),
      status: PropertyStatus::Available,
      is_active: true,
    }
  }
}

impl PropertyDraft {
  /// A new unit belonging to `parent`, prefilled with its address.
  pub fn unit_of(parent: &Property) -> Self {
    Self {
      property_type: PropertyType::Unit,
      address: parent.address.clone(),
      city: parent.city.clone().unwrap_or_default(),
      state: parent.state.clone().unwrap_or_default(),
      zip_code: parent.zip_code.clone().unwrap_or_default(),
      parent_property_id: parent.id.to_string(),
      ..Self::default()
    }
  }

  /// Draft for editing an existing property.
  pub fn from_property(property: &Property) -> Self {
    let count = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
    Self {
      property_type: property.property_type,
      name: property.name.clone().unwrap_or_default(),
      address: property.address.clone(),
      city: property.city.clone().unwrap_or_default(),
      state: property.state.clone().unwrap_or_default(),
      zip_code: property.zip_code.clone().unwrap_or_default(),
      bedrooms: count(property.bedrooms),
      bathrooms: count(property.bathrooms.map(|b| b.round() as u32)),
      parent_property_id: property
        .parent_property_id
        .map(|id| id.to_string())
        .unwrap_or_default(),
      status: property.status,
      is_active: property.is_active,
    }
  }

  pub fn validate(&self) -> Result<PropertyCreate, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let is_unit = self.property_type == PropertyType::Unit;

    let (name, address, city, state, zip_code) = if is_unit {
      (
        required(&mut errors, "name", "Unit name", &self.name),
        self.address.trim().to_string(),
        self.city.trim().to_string(),
        self.state.trim().to_string(),
        self.zip_code.trim().to_string(),
      )
    } else {
      (
        self.name.trim().to_string(),
        required(&mut errors, "address", "Address", &self.address),
        required(&mut errors, "city", "City", &self.city),
        required(&mut errors, "state", "State", &self.state),
        required(&mut errors, "zip_code", "ZIP code", &self.zip_code),
      )
    };

    if !zip_code.is_empty() && !is_zip_code(&zip_code) {
      errors.push("zip_code", "ZIP code must be 5 digits (optionally -1234)");
    }

    let bedrooms = room_count(&mut errors, "bedrooms", "Bedrooms", &self.bedrooms);
    let bathrooms = room_count(&mut errors, "bathrooms", "Bathrooms", &self.bathrooms);

    let parent_property_id = if is_unit {
      positive_id(
        &mut errors,
        "parent_property_id",
        "Parent property",
        &self.parent_property_id,
      )
    } else {
      None
    };

    errors.into_result(|| PropertyCreate {
      name: match name.is_empty() {
        true if !is_unit => Some(address.clone()),
        true => None,
        false => Some(name),
      },
      address,
      city,
      state,
      zip_code,
      property_type: self.property_type,
      bedrooms,
      bathrooms,
      status: self.status,
      is_active: self.is_active,
      parent_property_id,
    })
  }

  /// Validate and express the draft as a full update.
  pub fn to_update(&self) -> Result<PropertyUpdate, ValidationErrors> {
    let create = self.validate()?;
    Ok(PropertyUpdate {
      name: create.name,
      address: Some(create.address),
      city: Some(create.city),
      state: Some(create.state),
      zip_code: Some(create.zip_code),
      bedrooms: Some(create.bedrooms),
      bathrooms: Some(create.bathrooms),
      status: Some(create.status),
      is_active: Some(create.is_active),
    })
  }
}

// ============================================================================
// Tenants
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TenantDraft {
  pub first_name: String,
  pub last_name: String,
  pub property_id: String,
  pub lease_start: String,
  pub lease_end: String,
  pub monthly_rent: String,
  pub deposit: String,
  pub payment_day: String,
}

impl Default for TenantDraft {
  fn default() -> Self {
    Self {
      first_name: String::new(),
      last_name: String::new(),
      property_id: String::new(),
      lease_start: String::new(),
      lease_end: String::new(),
      monthly_rent: String::new(),
      deposit: String::new(),
      payment_day: "1".to_string(),
    }
  }
}

impl TenantDraft {
  pub fn for_property(property_id: EntityId) -> Self {
    Self {
      property_id: property_id.to_string(),
      ..Self::default()
    }
  }

  pub fn from_tenant(tenant: &Tenant) -> Self {
    Self {
      first_name: tenant.first_name.clone(),
      last_name: tenant.last_name.clone(),
      property_id: tenant.property_id.to_string(),
      lease_start: tenant.lease_start.to_string(),
      lease_end: tenant.lease_end.to_string(),
      monthly_rent: format!("{:.2}", tenant.monthly_rent),
      deposit: format!("{:.2}", tenant.deposit),
      payment_day: tenant.payment_day.to_string(),
    }
  }

  pub fn validate(&self) -> Result<TenantCreate, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let first_name = required(&mut errors, "first_name", "First name", &self.first_name);
    let last_name = required(&mut errors, "last_name", "Last name", &self.last_name);
    let property_id = positive_id(&mut errors, "property_id", "Property", &self.property_id);
    let lease_start = date(&mut errors, "lease_start", "Lease start", &self.lease_start);
    let lease_end = date(&mut errors, "lease_end", "Lease end", &self.lease_end);
    let monthly_rent = amount(&mut errors, "monthly_rent", "Monthly rent", &self.monthly_rent);
    let deposit = amount(&mut errors, "deposit", "Deposit", &self.deposit);

    let payment_day = match self.payment_day.trim().parse::<u8>() {
      Ok(day @ 1..=31) => day,
      _ => {
        errors.push("payment_day", "Payment day must be between 1 and 31");
        1
      }
    };

    if let (Some(start), Some(end)) = (lease_start, lease_end) {
      if end <= start {
        errors.push("lease_end", "Lease end must be after lease start");
      }
    }

    match (property_id, lease_start, lease_end) {
      (Some(property_id), Some(lease_start), Some(lease_end)) if errors.is_empty() => Ok(TenantCreate {
        first_name,
        last_name,
        property_id,
        lease_start,
        lease_end,
        monthly_rent,
        deposit,
        payment_day,
      }),
      _ => Err(errors),
    }
  }

  pub fn to_update(&self) -> Result<TenantUpdate, ValidationErrors> {
    let create = self.validate()?;
    Ok(TenantUpdate {
      first_name: Some(create.first_name),
      last_name: Some(create.last_name),
      property_id: Some(create.property_id),
      lease_start: Some(create.lease_start),
      lease_end: Some(create.lease_end),
      monthly_rent: Some(create.monthly_rent),
      deposit: Some(create.deposit),
      payment_day: Some(create.payment_day),
    })
  }
}
