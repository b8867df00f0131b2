use serde_json::json;
use std::sync::Arc;

use super::types::UserProfile;
use crate::cache::{CacheResult, QueryKey};
use crate::error::SyncError;
use crate::site::{PreSets, Site};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileKey {
  pub user_id: i64,
}

impl QueryKey for ProfileKey {
  fn cache_key(&self) -> String {
    format!("user:profile:{}", self.user_id)
  }

  fn description(&self) -> String {
    format!("profile of user {}", self.user_id)
  }
}

#[derive(Clone)]
pub struct UserService {
  site: Arc<Site>,
}

impl UserService {
  pub fn new(site: Arc<Site>) -> Self {
    Self { site }
  }

  /// Public profile of a user; `EmptyResult` when the site does not know them.
  pub async fn get_profile(&self, user_id: i64, use_cache: bool) -> Result<CacheResult<UserProfile>, SyncError> {
    let key = ProfileKey { user_id };
    let result = self
      .site
      .read::<Vec<UserProfile>>(
        "core_user_get_users_by_field",
        json!({ "field": "id", "values": [user_id] }),
        PreSets::keyed(&key, use_cache),
      )
      .await?;

    let CacheResult { data, source, cached_at } = result;
    let profile = data
      .into_iter()
      .find(|u| u.id == user_id)
      .ok_or_else(SyncError::empty)?;
    Ok(CacheResult { data: profile, source, cached_at })
  }

  pub fn invalidate_profile(&self, user_id: i64) -> Result<(), SyncError> {
    self
      .site
      .invalidate_ws_cache_for_key(&ProfileKey { user_id }.cache_key())
  }
}
