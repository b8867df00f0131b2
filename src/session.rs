//! The services of one logged-in site.
//!
//! A `Session` owns the site connection, the response cache and the file
//! pool. Everything is created on `start` and released on `end`; `logout`
//! additionally wipes the site's cached responses and downloaded files.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::cache::{ResponseCache, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::error::SyncError;
use crate::event::{EventHandler, SyncEvent};
use crate::filepool::{FilePool, FileRecordStore, HttpFileTransport};
use crate::services::{CertificateService, CompetencyService, UserService};
use crate::site::{HttpWsTransport, Site};
use crate::sync::{ErrorMessages, SyncOperation, SyncSource};

pub struct Session {
  site: Arc<Site>,
  files: Arc<FilePool>,
  messages: Arc<ErrorMessages>,
  events: EventHandler,
}

impl Session {
  /// Open the site's local data and connect to it.
  pub async fn start(config: &Config, token: &str) -> Result<Self> {
    let site_id = config.site_id();
    let db = Database::open(&config.database_path()?)?;
    let cache = ResponseCache::new(SqliteStorage::new(db.clone()));

    let transport = HttpWsTransport::new(&config.site.url, token)
      .map_err(|e| eyre!("Failed to create web service client: {}", e))?;
    let site = Site::connect(&site_id, &config.site.url, token, Arc::new(transport), cache)
      .await
      .map_err(|e| eyre!("Failed to connect to {}: {}", config.site.url, e))?;

    let files_dir = config.files_dir()?;
    let file_transport = HttpFileTransport::new(files_dir.clone(), config.files.enabled)
      .map_err(|e| eyre!("Failed to create download client: {}", e))?;
    let files = FilePool::new(
      FileRecordStore::new(db),
      Arc::new(file_transport),
      files_dir,
      token,
    );

    info!(site = %site_id, user = site.user_id(), "session started");
    Ok(Self::from_parts(site, files, config.errors.clone()))
  }

  pub fn from_parts(site: Site, files: FilePool, messages: ErrorMessages) -> Self {
    Self {
      site: Arc::new(site),
      files: Arc::new(files),
      messages: Arc::new(messages),
      events: EventHandler::new(),
    }
  }

  pub fn site(&self) -> &Arc<Site> {
    &self.site
  }

  pub fn messages(&self) -> &Arc<ErrorMessages> {
    &self.messages
  }

  pub fn events(&mut self) -> &mut EventHandler {
    &mut self.events
  }

  pub fn events_sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
    self.events.sender()
  }

  pub fn competency(&self) -> CompetencyService {
    CompetencyService::new(Arc::clone(&self.site))
  }

  pub fn certificates(&self) -> CertificateService {
    CertificateService::new(Arc::clone(&self.site), Arc::clone(&self.files))
  }

  pub fn users(&self) -> UserService {
    UserService::new(Arc::clone(&self.site))
  }

  /// Wrap a controller in the sync protocol, reporting to this session.
  pub fn operation<S: SyncSource>(&self, source: S) -> SyncOperation<S> {
    SyncOperation::new(source, Arc::clone(&self.messages), self.events_sender())
  }

  /// Release the session, keeping cached data for the next one.
  pub fn end(self) {
    info!(site = self.site.id(), "session ended");
  }

  /// Release the session and drop everything it cached.
  pub async fn logout(self) -> Result<(), SyncError> {
    self.site.cache().clear()?;
    self.files.clear()?;

    let root = self.files.root().to_path_buf();
    match tokio::fs::remove_dir_all(&root).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(SyncError::Storage(format!("Failed to remove {}: {}", root.display(), e))),
    }

    info!(site = self.site.id(), "logged out, cached data removed");
    Ok(())
  }
}
