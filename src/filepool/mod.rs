//! Local cache of downloaded files.
//!
//! Every file belongs to an owner (component + component id) and is tracked
//! with the revision and remote modification time it was downloaded for.
//! A copy is served while both still match; invalidation marks an owner's
//! files stale so the next access downloads them again.

mod pool;
mod record;
mod transport;
#[cfg(test)]
pub mod testing;

pub use pool::{FilePool, LocalUrl, PackageFile, PackageStatus};
pub use record::{FileOwner, FileRecordStore};
pub use transport::HttpFileTransport;
