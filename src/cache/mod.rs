//! Response cache for web-service reads.
//!
//! This module provides a keyed store of the last successful response of each
//! cacheable read:
//! - Read-through with an explicit bypass flag
//! - Invalidation by exact key or by key prefix
//! - No expiry; entries live until invalidated or the session logs out

mod layer;
mod storage;
mod traits;

pub use layer::ResponseCache;
pub use storage::SqliteStorage;
pub(crate) use storage::parse_datetime;
pub use traits::{CacheResult, CacheSource, QueryKey};
