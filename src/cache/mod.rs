//! In-memory entity cache shared by every view.
//!
//! - Entities are keyed by id, one cache per entity type
//! - Concurrent fetches of the same id share a single request
//! - Out-of-order responses never overwrite a newer value
//! - Storage is pluggable: bounded LRU memory or no caching at all

mod layer;
mod storage;
mod traits;

pub use layer::EntityCache;
pub use storage::{CacheStorage, MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
