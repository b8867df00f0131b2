//! Presentation adapters.
//!
//! Each controller is a `SyncSource`: it knows which reads feed one screen,
//! how to invalidate them and how to shape the answers into display state.
//! Rendering is left to the caller; the CLI prints the state as JSON.

mod certificate;
mod competencies;
mod competency;
mod learning_plans;

pub use certificate::{CertificateController, ModuleRef};
pub use competencies::CompetenciesController;
pub use competency::CompetencyController;
pub use learning_plans::LearningPlansController;

use serde::Serialize;
use tracing::warn;

use crate::services::UserService;

/// Picture shown next to another user's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum ProfileImage {
  Url(String),
  /// Default icon, used when the picture is unknown
  Placeholder,
}

impl ProfileImage {
  fn from_url(url: Option<&str>) -> Self {
    match url {
      Some(url) if !url.is_empty() => ProfileImage::Url(url.to_string()),
      _ => ProfileImage::Placeholder,
    }
  }
}

/// Best-effort lookup of a user's picture. Never fails the caller.
async fn profile_image(users: &UserService, user_id: i64) -> ProfileImage {
  match users.get_profile(user_id, true).await {
    Ok(profile) => ProfileImage::from_url(profile.data.profileimageurl.as_deref()),
    Err(e) => {
      warn!(user_id, error = %e, "Failed to load user profile, using placeholder");
      ProfileImage::Placeholder
    }
  }
}
