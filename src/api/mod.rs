//! Client for the rental management REST API.

pub mod client;
pub mod error;
pub mod filters;
pub mod resource;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use filters::{ListFilters, PropertyFilter, PropertyFilters, TenantFilter, TenantFilters};
pub use resource::Resource;
pub use types::{
  EntityId, Property, PropertyCreate, PropertyStatus, PropertyType, PropertyUpdate, Tenant,
  TenantCreate, TenantUpdate,
};
