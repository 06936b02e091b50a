//! Pollable data handles consumed by views.
//!
//! Each handle is owned by one view and polled on every tick. Requests run as
//! spawned tasks; results are picked up by the next poll.

mod debounce;
pub mod entity;
pub mod list;
pub mod mutation;
pub mod parent;

pub use entity::EntityQuery;
pub use list::{ListController, ListSettings, PageFetcher, PageRequest};
pub use mutation::{EntityWriter, MutationBus, MutationEvent};
pub use parent::{ParentQuery, PropertyWithParent};
