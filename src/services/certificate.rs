//! Certificate activities and their issued PDFs.

use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::types::{Certificate, CertificateList, IssueResponse, IssuedCertificate, IssuedCertificates, WriteStatus};
use crate::cache::{CacheResult, QueryKey};
use crate::error::{SyncError, TransportError};
use crate::filepool::{FileOwner, FilePool, LocalUrl, PackageFile, PackageStatus};
use crate::site::{PreSets, Site};

/// File pool component owning downloaded certificates
pub const COMPONENT: &str = "mod_certificate";

const GET_CERTIFICATES: &str = "mod_certificate_get_certificates_by_courses";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateKey {
  Certificate { course_id: i64 },
  Issued { certificate_id: i64 },
}

impl QueryKey for CertificateKey {
  fn cache_key(&self) -> String {
    match self {
      Self::Certificate { course_id } => format!("certificate:certificate:{}", course_id),
      Self::Issued { certificate_id } => format!("certificate:issued:{}", certificate_id),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Certificate { course_id } => format!("certificates of course {}", course_id),
      Self::Issued { certificate_id } => format!("issues of certificate {}", certificate_id),
    }
  }
}

#[derive(Clone)]
pub struct CertificateService {
  site: Arc<Site>,
  files: Arc<FilePool>,
}

impl CertificateService {
  pub fn new(site: Arc<Site>, files: Arc<FilePool>) -> Self {
    Self { site, files }
  }

  /// The certificate of the course whose course module is `module_id`.
  pub async fn get_certificate(
    &self,
    course_id: i64,
    module_id: i64,
    use_cache: bool,
  ) -> Result<CacheResult<Certificate>, SyncError> {
    let key = CertificateKey::Certificate { course_id };
    let result = self
      .site
      .read::<CertificateList>(
        GET_CERTIFICATES,
        json!({ "courseids": [course_id] }),
        PreSets::keyed(&key, use_cache),
      )
      .await?;

    let CacheResult { data, source, cached_at } = result;
    let certificate = data
      .certificates
      .into_iter()
      .rev()
      .find(|c| c.coursemodule == module_id)
      .ok_or_else(SyncError::empty)?;
    Ok(CacheResult { data: certificate, source, cached_at })
  }

  pub async fn get_issued_certificates(
    &self,
    certificate_id: i64,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<IssuedCertificate>>, SyncError> {
    let key = CertificateKey::Issued { certificate_id };
    let result = self
      .site
      .read::<IssuedCertificates>(
        "mod_certificate_get_issued_certificates",
        json!({ "certificateid": certificate_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await?;

    let CacheResult { data, source, cached_at } = result;
    let issues = data.issues.ok_or_else(SyncError::empty)?;
    Ok(CacheResult { data: issues, source, cached_at })
  }

  pub fn invalidate_certificate(&self, course_id: i64) -> Result<(), SyncError> {
    let key = CertificateKey::Certificate { course_id };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  pub fn invalidate_issued_certificates(&self, certificate_id: i64) -> Result<(), SyncError> {
    let key = CertificateKey::Issued { certificate_id };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  /// Force the next open of the module's certificate to download it again.
  pub fn invalidate_downloaded_certificates(&self, module_id: i64) -> Result<(), SyncError> {
    self.files.invalidate(&FileOwner::new(COMPONENT, module_id))
  }

  pub fn is_plugin_enabled(&self) -> bool {
    self.site.ws_available(GET_CERTIFICATES)
  }

  pub async fn log_view(&self, certificate_id: i64) -> Result<WriteStatus, SyncError> {
    self
      .site
      .write(
        "mod_certificate_view_certificate",
        json!({ "certificateid": certificate_id }),
      )
      .await
  }

  /// Ask the site to issue the certificate to the current user.
  pub async fn issue_certificate(&self, certificate_id: i64) -> Result<IssuedCertificate, SyncError> {
    let response: IssueResponse = self
      .site
      .write(
        "mod_certificate_issue_certificate",
        json!({ "certificateid": certificate_id }),
      )
      .await?;
    response.issue.ok_or_else(|| {
      SyncError::Transport(TransportError::InvalidResponse(
        "certificate was not issued".to_string(),
      ))
    })
  }

  /// Whether the issue's file is on this device and current.
  pub fn download_status(&self, issue: &IssuedCertificate, module_id: i64) -> Result<PackageStatus, SyncError> {
    self
      .files
      .package_status(&FileOwner::new(COMPONENT, module_id), 0, issue.timecreated)
  }

  /// Location of the issued certificate's file, downloading it if needed.
  ///
  /// The file is versioned by the issue's creation time. Without local
  /// storage the live URL is returned.
  pub async fn open_certificate(
    &self,
    issue: &IssuedCertificate,
    module_id: i64,
  ) -> Result<LocalUrl, SyncError> {
    if !self.files.is_available() {
      return Ok(LocalUrl::Remote(self.site.fix_pluginfile_url(&issue.fileurl)));
    }

    let owner = FileOwner::new(COMPONENT, module_id);
    let revision = 0;
    let timemodified = issue.timecreated;
    let files = [PackageFile {
      fileurl: issue.fileurl.clone(),
      filename: issue.filename.clone(),
      timemodified,
    }];

    let mut downloaded = self.files.download_package(&owner, &files, revision).await?;
    match self.files.url_by_url(&owner, &issue.fileurl, timemodified).await? {
      Some(path) => Ok(LocalUrl::Local(path)),
      None => {
        debug!(%owner, url = %issue.fileurl, "downloaded certificate not recorded, using download result");
        downloaded.pop().ok_or_else(SyncError::empty)
      }
    }
  }
}
