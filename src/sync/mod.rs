//! Stale-cache tolerant synchronization.
//!
//! Every controller is a `SyncSource`; `SyncOperation` runs it through the
//! fetch, retry-without-cache and pull-to-refresh protocol.

mod context;
mod messages;
mod operation;

pub use context::Context;
pub use messages::{EntityType, ErrorMessages};
pub use operation::{SyncOperation, SyncResult, SyncSource};
