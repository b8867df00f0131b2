//! In-memory file transport for tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use super::transport::FileTransport;
use super::{FilePool, FileRecordStore};
use crate::db::Database;
use crate::error::DownloadError;

/// Writes a small file for every download and counts them.
pub struct FakeFiles {
  pub downloads: AtomicU32,
  pub last_url: Mutex<Option<String>>,
  pub available: AtomicBool,
  pub failing: AtomicBool,
}

impl FakeFiles {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      downloads: AtomicU32::new(0),
      last_url: Mutex::new(None),
      available: AtomicBool::new(true),
      failing: AtomicBool::new(false),
    })
  }

  pub fn downloads(&self) -> u32 {
    self.downloads.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl FileTransport for FakeFiles {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(DownloadError::Status {
        url: url.to_string(),
        status: 404,
      });
    }
    self.downloads.fetch_add(1, Ordering::SeqCst);
    *self.last_url.lock().unwrap() = Some(url.to_string());
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::write(dest, b"%PDF-1.4").unwrap();
    Ok(8)
  }

  fn is_storage_available(&self) -> bool {
    self.available.load(Ordering::SeqCst)
  }

  async fn exists(&self, path: &Path) -> bool {
    path.exists()
  }
}

/// Pool over an in-memory record store, storing files under `dir`.
pub fn pool(files: &Arc<FakeFiles>, dir: &TempDir) -> FilePool {
  let store = FileRecordStore::new(Database::open_in_memory().unwrap());
  FilePool::new(store, files.clone(), dir.path().to_path_buf(), "secret")
}
