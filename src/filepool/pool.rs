use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::record::{FileOwner, FileRecord, FileRecordStore};
use super::transport::FileTransport;
use crate::error::SyncError;
use crate::site::fix_pluginfile_url;

/// Where a file can be opened from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum LocalUrl {
  /// Downloaded copy on this device
  Local(PathBuf),
  /// Live remote URL, used when the device cannot keep files
  Remote(String),
}

impl fmt::Display for LocalUrl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LocalUrl::Local(path) => write!(f, "file://{}", path.display()),
      LocalUrl::Remote(url) => write!(f, "{}", url),
    }
  }
}

/// One file of a downloadable package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFile {
  pub fileurl: String,
  #[serde(default)]
  pub filename: String,
  #[serde(default)]
  pub timemodified: i64,
}

/// Download state of an owner's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
  NotDownloaded,
  Downloaded,
  Outdated,
}

/// Revision/timestamp addressed cache of downloaded files.
///
/// A file is downloaded once per (owner, url) and served locally for as long
/// as its record is valid for the requested revision and modification time.
pub struct FilePool {
  store: FileRecordStore,
  transport: Arc<dyn FileTransport>,
  root: PathBuf,
  token: String,
}

impl FilePool {
  pub fn new(store: FileRecordStore, transport: Arc<dyn FileTransport>, root: PathBuf, token: &str) -> Self {
    Self {
      store,
      transport,
      root,
      token: token.to_string(),
    }
  }

  pub fn is_available(&self) -> bool {
    self.transport.is_storage_available()
  }

  /// Get a usable location for `url`, downloading it if needed.
  pub async fn resolve(
    &self,
    owner: &FileOwner,
    url: &str,
    revision: i64,
    timemodified: i64,
  ) -> Result<LocalUrl, SyncError> {
    if !self.is_available() {
      debug!(%owner, url, "file storage unavailable, using live url");
      return Ok(LocalUrl::Remote(fix_pluginfile_url(url, &self.token)));
    }

    if let Some(path) = self.valid_copy(owner, url, revision, timemodified).await? {
      debug!(%owner, url, "serving downloaded file");
      return Ok(LocalUrl::Local(path));
    }

    let dest = self.local_path(owner, url);
    let fixed = fix_pluginfile_url(url, &self.token);
    info!(%owner, url, revision, timemodified, "downloading file");
    self.transport.download(&fixed, &dest).await?;

    let record = FileRecord {
      owner: owner.clone(),
      file_url: url.to_string(),
      revision,
      timemodified,
      path: dest.clone(),
      stale: false,
      downloaded_at: chrono::Utc::now(),
    };
    self.store.upsert(&record).map_err(storage_error)?;

    Ok(LocalUrl::Local(dest))
  }

  /// Resolve every file of a package, in order.
  pub async fn download_package(
    &self,
    owner: &FileOwner,
    files: &[PackageFile],
    revision: i64,
  ) -> Result<Vec<LocalUrl>, SyncError> {
    let mut resolved = Vec::with_capacity(files.len());
    for file in files {
      resolved.push(
        self
          .resolve(owner, &file.fileurl, revision, file.timemodified)
          .await?,
      );
    }
    Ok(resolved)
  }

  /// Local path of an already downloaded, still valid file. Never downloads.
  pub async fn url_by_url(
    &self,
    owner: &FileOwner,
    url: &str,
    timemodified: i64,
  ) -> Result<Option<PathBuf>, SyncError> {
    self.valid_copy(owner, url, 0, timemodified).await
  }

  /// Summarize the state of every file recorded for `owner`.
  pub fn package_status(
    &self,
    owner: &FileOwner,
    revision: i64,
    timemodified: i64,
  ) -> Result<PackageStatus, SyncError> {
    let records = self.store.list(owner).map_err(storage_error)?;
    if records.is_empty() {
      return Ok(PackageStatus::NotDownloaded);
    }
    if records.iter().all(|r| r.is_valid_for(revision, timemodified)) {
      Ok(PackageStatus::Downloaded)
    } else {
      Ok(PackageStatus::Outdated)
    }
  }

  /// Force a download of every file of `owner` on next access.
  ///
  /// Files already on disk are kept until replaced.
  pub fn invalidate(&self, owner: &FileOwner) -> Result<(), SyncError> {
    let changed = self.store.mark_stale(owner).map_err(storage_error)?;
    debug!(%owner, changed, "invalidated files");
    Ok(())
  }

  /// Forget every record. Used when the session logs out.
  pub fn clear(&self) -> Result<(), SyncError> {
    self.store.clear().map_err(storage_error)
  }

  async fn valid_copy(
    &self,
    owner: &FileOwner,
    url: &str,
    revision: i64,
    timemodified: i64,
  ) -> Result<Option<PathBuf>, SyncError> {
    let record = match self.store.get(owner, url).map_err(storage_error)? {
      Some(record) => record,
      None => return Ok(None),
    };
    if !record.is_valid_for(revision, timemodified) {
      debug!(
        %owner,
        url,
        stored_revision = record.revision,
        stored_timemodified = record.timemodified,
        stale = record.stale,
        "downloaded file is outdated"
      );
      return Ok(None);
    }
    if !self.transport.exists(&record.path).await {
      debug!(%owner, url, "downloaded file is missing on disk");
      return Ok(None);
    }
    Ok(Some(record.path))
  }

  /// `<root>/<component>/<component id>/<url hash>_<file name>`
  fn local_path(&self, owner: &FileOwner, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hex::encode(hasher.finalize());
    let name = format!("{}_{}", &hash[..16], file_name(url));
    self
      .root
      .join(sanitize(&owner.component))
      .join(sanitize(&owner.component_id))
      .join(name)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

fn storage_error(e: color_eyre::Report) -> SyncError {
  SyncError::Storage(e.to_string())
}

/// Last path segment of a URL, without query, made safe for the file system.
fn file_name(url: &str) -> String {
  let without_query = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
  let last = without_query.rsplit('/').next().unwrap_or("");
  let name = sanitize(last);
  if name.is_empty() {
    "file".to_string()
  } else {
    name
  }
}

fn sanitize(s: &str) -> String {
  s.chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
        c
      } else {
        '_'
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DownloadError;
  use crate::filepool::testing::{pool, FakeFiles};
  use std::sync::atomic::Ordering;
  use tempfile::TempDir;

  const URL: &str = "https://campus.example.edu/pluginfile.php/5/mod_certificate/issue/9/cert.pdf";

  #[tokio::test]
  async fn test_identical_resolves_download_once() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    let first = pool.resolve(&owner, URL, 0, 1_700_000_000).await.unwrap();
    let second = pool.resolve(&owner, URL, 0, 1_700_000_000).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(files.downloads(), 1);
    match first {
      LocalUrl::Local(path) => {
        assert!(path.starts_with(dir.path()));
        assert!(path.to_string_lossy().ends_with("_cert.pdf"));
      }
      other => panic!("expected local file, got {:?}", other),
    }
    // Downloads go through the tokenized endpoint
    let requested = files.last_url.lock().unwrap().clone().unwrap();
    assert!(requested.contains("/webservice/pluginfile.php/"));
    assert!(requested.contains("token=secret"));
  }

  #[tokio::test]
  async fn test_newer_revision_redownloads() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    pool.resolve(&owner, URL, 0, 100).await.unwrap();
    pool.resolve(&owner, URL, 2, 100).await.unwrap();
    assert_eq!(files.downloads(), 2);

    let record = pool.store.get(&owner, URL).unwrap().unwrap();
    assert_eq!(record.revision, 2);

    // Asking for an older revision is served by the newer copy
    pool.resolve(&owner, URL, 1, 100).await.unwrap();
    assert_eq!(files.downloads(), 2);
  }

  #[tokio::test]
  async fn test_changed_timemodified_redownloads() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    pool.resolve(&owner, URL, 0, 100).await.unwrap();
    pool.resolve(&owner, URL, 0, 200).await.unwrap();
    assert_eq!(files.downloads(), 2);
  }

  #[tokio::test]
  async fn test_invalidate_forces_download_and_keeps_bytes() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    let first = pool.resolve(&owner, URL, 0, 100).await.unwrap();
    pool.invalidate(&owner).unwrap();

    if let LocalUrl::Local(path) = &first {
      assert!(path.exists());
    }
    assert_eq!(
      pool.package_status(&owner, 0, 100).unwrap(),
      PackageStatus::Outdated
    );

    pool.resolve(&owner, URL, 0, 100).await.unwrap();
    assert_eq!(files.downloads(), 2);
    assert_eq!(
      pool.package_status(&owner, 0, 100).unwrap(),
      PackageStatus::Downloaded
    );
  }

  #[tokio::test]
  async fn test_missing_file_on_disk_redownloads() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    if let LocalUrl::Local(path) = pool.resolve(&owner, URL, 0, 100).await.unwrap() {
      std::fs::remove_file(path).unwrap();
    }
    pool.resolve(&owner, URL, 0, 100).await.unwrap();
    assert_eq!(files.downloads(), 2);
  }

  #[tokio::test]
  async fn test_storage_unavailable_returns_live_url() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    files.available.store(false, Ordering::SeqCst);
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    let url = pool.resolve(&owner, URL, 0, 100).await.unwrap();
    assert_eq!(
      url,
      LocalUrl::Remote(
        "https://campus.example.edu/webservice/pluginfile.php/5/mod_certificate/issue/9/cert.pdf?token=secret"
          .to_string()
      )
    );
    assert_eq!(files.downloads(), 0);
  }

  #[tokio::test]
  async fn test_download_failure_surfaces() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    files.failing.store(true, Ordering::SeqCst);
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_certificate", 12);

    let err = pool.resolve(&owner, URL, 0, 100).await.unwrap_err();
    assert!(matches!(err, SyncError::Download(DownloadError::Status { status: 404, .. })));
    assert!(pool.store.get(&owner, URL).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_package_and_url_lookup() {
    let dir = TempDir::new().unwrap();
    let files = FakeFiles::new();
    let pool = pool(&files, &dir);
    let owner = FileOwner::new("mod_resource", 3);

    assert_eq!(
      pool.package_status(&owner, 1, 50).unwrap(),
      PackageStatus::NotDownloaded
    );
    assert!(pool.url_by_url(&owner, URL, 50).await.unwrap().is_none());

    let package = vec![
      PackageFile {
        fileurl: URL.to_string(),
        filename: "cert.pdf".to_string(),
        timemodified: 50,
      },
      PackageFile {
        fileurl: "https://campus.example.edu/pluginfile.php/5/mod_resource/content/1/notes.txt".to_string(),
        filename: "notes.txt".to_string(),
        timemodified: 50,
      },
    ];
    let resolved = pool.download_package(&owner, &package, 1).await.unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(files.downloads(), 2);
    assert_eq!(
      pool.package_status(&owner, 1, 50).unwrap(),
      PackageStatus::Downloaded
    );
    assert!(pool.url_by_url(&owner, URL, 50).await.unwrap().is_some());
    assert!(pool.url_by_url(&owner, URL, 51).await.unwrap().is_none());
  }

  #[test]
  fn test_file_name_from_url() {
    assert_eq!(file_name("https://x/a/b/cert.pdf?forcedownload=1"), "cert.pdf");
    assert_eq!(file_name("https://x/a/b/my cert.pdf"), "my_cert.pdf");
    assert_eq!(file_name("https://x/"), "file");
  }
}
