//! Cache stores for Voltwise.
//!
//! Backends implement [`voltwise_core::CacheStore`]; the request path talks
//! to them through [`ResilientCache`], which bounds every call with a
//! timeout and turns every failure into a miss.

pub mod disabled;
pub mod key;
pub mod memory;
pub mod resilient;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use disabled::DisabledCache;
pub use key::{cache_key, normalize_query};
pub use memory::InMemoryCache;
pub use resilient::{CacheStats, ResilientCache};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;
