use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::DownloadError;

/// Download timeout in seconds; certificates and attachments can be large
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Platform file access used by the file pool.
#[async_trait]
pub trait FileTransport: Send + Sync {
  /// Fetch `url` into `dest`, returning the number of bytes written.
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;

  /// Whether files can be persisted at all on this device.
  fn is_storage_available(&self) -> bool;

  async fn exists(&self, path: &Path) -> bool;
}

/// HTTP downloads into a local directory.
pub struct HttpFileTransport {
  http: reqwest::Client,
  root: PathBuf,
  enabled: bool,
}

impl HttpFileTransport {
  pub fn new(root: PathBuf, enabled: bool) -> Result<Self, DownloadError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
      .build()
      .map_err(|e| DownloadError::Network {
        url: String::new(),
        reason: e.to_string(),
      })?;
    Ok(Self { http, root, enabled })
  }
}

#[async_trait]
impl FileTransport for HttpFileTransport {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    let network = |e: reqwest::Error| DownloadError::Network {
      url: url.to_string(),
      reason: e.to_string(),
    };
    let write = |e: std::io::Error| DownloadError::Write {
      path: dest.display().to_string(),
      reason: e.to_string(),
    };

    let response = self.http.get(url).send().await.map_err(network)?;
    let status = response.status();
    if !status.is_success() {
      return Err(DownloadError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }
    let bytes = response.bytes().await.map_err(network)?;

    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(write)?;
    }
    // Partial downloads never land on the final path
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes).await.map_err(write)?;
    tokio::fs::rename(&partial, dest).await.map_err(write)?;

    debug!(url, path = %dest.display(), bytes = bytes.len(), "downloaded file");
    Ok(bytes.len() as u64)
  }

  fn is_storage_available(&self) -> bool {
    self.enabled && std::fs::create_dir_all(&self.root).is_ok()
  }

  async fn exists(&self, path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
  }
}
