use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::CacheResult;
use crate::error::SyncError;
use crate::event::SyncEvent;
use crate::filepool::{LocalUrl, PackageStatus};
use crate::services::types::{Certificate, IssuedCertificate};
use crate::services::CertificateService;
use crate::session::Session;
use crate::sync::{EntityType, ErrorMessages, SyncSource};

/// Course module hosting the certificate, as known before loading it.
#[derive(Debug, Clone, Default)]
pub struct ModuleRef {
  pub id: i64,
  pub name: String,
  pub description: String,
}

/// A course's certificate activity and the user's issued copies.
pub struct CertificateController {
  certificates: CertificateService,
  course_id: i64,
  module: ModuleRef,
  /// Last certificate loaded, needed to invalidate its issues
  last: Mutex<Option<Certificate>>,
  viewed: AtomicBool,
  messages: Arc<ErrorMessages>,
  events: mpsc::UnboundedSender<SyncEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateView {
  pub title: String,
  pub description: String,
  pub course_id: i64,
  pub certificate: Certificate,
  /// Empty while the required time in the course is not met
  pub issues: Vec<IssuedCertificate>,
}

impl CertificateController {
  pub fn new(session: &Session, course_id: i64, module: ModuleRef) -> Self {
    Self {
      certificates: session.certificates(),
      course_id,
      module,
      last: Mutex::new(None),
      viewed: AtomicBool::new(false),
      messages: Arc::clone(session.messages()),
      events: session.events_sender(),
    }
  }

  fn remember(&self, certificate: &Certificate) {
    if let Ok(mut last) = self.last.lock() {
      *last = Some(certificate.clone());
    }
  }

  fn last_certificate(&self) -> Option<Certificate> {
    self.last.lock().ok().and_then(|last| last.clone())
  }

  async fn log_view_once(&self, certificate_id: i64) {
    if self.viewed.swap(true, Ordering::SeqCst) {
      return;
    }
    match self.certificates.log_view(certificate_id).await {
      Ok(status) => debug!(certificate_id, status = status.status, "logged certificate view"),
      Err(e) => warn!(certificate_id, error = %e, "Failed to log certificate view"),
    }
  }

  /// Download state of the first issue's file. Unknown when nothing was issued.
  pub fn download_status(&self, view: &CertificateView) -> Option<PackageStatus> {
    let issue = view.issues.first()?;
    match self.certificates.download_status(issue, self.module.id) {
      Ok(status) => Some(status),
      Err(e) => {
        warn!(module = self.module.id, error = %e, "Failed to read certificate download state");
        None
      }
    }
  }

  /// Open the first issued certificate, downloading it when needed.
  ///
  /// Every issue points at the same file. Failures are reported on the event
  /// channel and returned as the user-facing message.
  pub async fn open(&self, view: &CertificateView) -> Result<LocalUrl, String> {
    let entity = EntityType::CertificateDownload;
    let result = match view.issues.first() {
      Some(issue) => self.certificates.open_certificate(issue, self.module.id).await,
      None => Err(SyncError::empty()),
    };

    result.map_err(|e| {
      let message = e
        .user_message()
        .map(String::from)
        .unwrap_or_else(|| self.messages.get(entity).to_string());
      warn!(module = self.module.id, error = %e, "Failed to open certificate");
      let _ = self.events.send(SyncEvent::Error {
        entity,
        message: message.clone(),
      });
      message
    })
  }
}

#[async_trait]
impl SyncSource for CertificateController {
  type Output = CertificateView;

  fn entity(&self) -> EntityType {
    EntityType::Certificate
  }

  async fn load(&self, use_cache: bool) -> Result<CacheResult<CertificateView>, SyncError> {
    let certificate = self
      .certificates
      .get_certificate(self.course_id, self.module.id, use_cache)
      .await?;
    self.remember(&certificate.data);

    let issues = if certificate.data.requiredtimenotmet {
      debug!(certificate = certificate.data.id, "required time not met, skipping issue");
      CacheResult {
        data: Vec::new(),
        source: certificate.source,
        cached_at: certificate.cached_at,
      }
    } else {
      // Issuing needs the network; the issued list below still has the cache
      if let Err(e) = self.certificates.issue_certificate(certificate.data.id).await {
        info!(certificate = certificate.data.id, error = %e, "Could not issue certificate");
      }
      self
        .certificates
        .get_issued_certificates(certificate.data.id, use_cache)
        .await?
    };

    let certificate_id = certificate.data.id;
    let result = certificate.and(issues).map(|(certificate, issues)| CertificateView {
      title: non_empty(&certificate.name, &self.module.name),
      description: non_empty(&certificate.intro, &self.module.description),
      course_id: self.course_id,
      certificate,
      issues,
    });

    self.log_view_once(certificate_id).await;
    Ok(result)
  }

  async fn invalidate(&self) -> Result<(), SyncError> {
    // Only the issued list needs the certificate id; files hang off the module
    let issued_id = self
      .last_certificate()
      .filter(|c| !c.requiredtimenotmet)
      .map(|c| c.id);

    let (certificate, issued, files) = futures::join!(
      async { self.certificates.invalidate_certificate(self.course_id) },
      async {
        match issued_id {
          Some(id) => self.certificates.invalidate_issued_certificates(id),
          None => Ok(()),
        }
      },
      async { self.certificates.invalidate_downloaded_certificates(self.module.id) },
    );
    certificate.and(issued).and(files)
  }
}

fn non_empty(value: &str, fallback: &str) -> String {
  if value.is_empty() {
    fallback.to_string()
  } else {
    value.to_string()
  }
}
