//! One remote site as seen by the session.
//!
//! `Site` wraps the raw web-service transport with the response cache, the
//! same way every service expects: reads go through the cache under a key,
//! writes always hit the network and are never stored.

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod testing;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheResult, QueryKey, ResponseCache, SqliteStorage};
use crate::error::SyncError;

pub use api_types::SiteInfo;
pub use client::{HttpWsTransport, WsTransport};

const SITE_INFO_FUNCTION: &str = "core_webservice_get_site_info";
const SITE_INFO_KEY: &str = "site:info";

/// Cache directives for a read.
#[derive(Debug, Clone)]
pub struct PreSets {
  /// Explicit key; derived from function and parameters when absent
  pub cache_key: Option<String>,
  /// Serve a cached answer when there is one
  pub get_from_cache: bool,
  /// What the read is for, in logs
  pub description: Option<String>,
}

impl PreSets {
  pub fn keyed(key: &impl QueryKey, use_cache: bool) -> Self {
    Self {
      cache_key: Some(key.cache_key()),
      get_from_cache: use_cache,
      description: Some(key.description()),
    }
  }
}

impl Default for PreSets {
  fn default() -> Self {
    Self {
      cache_key: None,
      get_from_cache: true,
      description: None,
    }
  }
}

pub struct Site {
  id: String,
  url: String,
  token: String,
  info: SiteInfo,
  transport: Arc<dyn WsTransport>,
  cache: ResponseCache<SqliteStorage>,
}

impl Site {
  pub fn new(
    id: &str,
    url: &str,
    token: &str,
    info: SiteInfo,
    transport: Arc<dyn WsTransport>,
    cache: ResponseCache<SqliteStorage>,
  ) -> Self {
    Self {
      id: id.to_string(),
      url: url.to_string(),
      token: token.to_string(),
      info,
      transport,
      cache,
    }
  }

  /// Connect to a site, loading its info.
  ///
  /// The info is refreshed from the network when possible; when the site is
  /// unreachable the last cached copy lets the session start offline.
  pub async fn connect(
    id: &str,
    url: &str,
    token: &str,
    transport: Arc<dyn WsTransport>,
    cache: ResponseCache<SqliteStorage>,
  ) -> Result<Self, SyncError> {
    let mut site = Self::new(id, url, token, SiteInfo::default(), transport, cache);

    let presets = PreSets {
      cache_key: Some(SITE_INFO_KEY.to_string()),
      get_from_cache: false,
      description: Some("site info".to_string()),
    };
    let info = match site.read::<SiteInfo>(SITE_INFO_FUNCTION, json!({}), presets.clone()).await {
      Ok(result) => result.data,
      Err(e) => {
        warn!(site = id, error = %e, "Site unreachable, using cached site info");
        let cached = PreSets {
          get_from_cache: true,
          ..presets
        };
        site.read::<SiteInfo>(SITE_INFO_FUNCTION, json!({}), cached).await?.data
      }
    };

    info!(site = id, url = %site.url, user = info.userid, "connected");
    site.info = info;
    Ok(site)
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Id of the user owning the session
  pub fn user_id(&self) -> i64 {
    self.info.userid
  }

  pub fn cache(&self) -> &ResponseCache<SqliteStorage> {
    &self.cache
  }

  /// Cacheable read.
  pub async fn read<T>(
    &self,
    function: &str,
    params: Value,
    presets: PreSets,
  ) -> Result<CacheResult<T>, SyncError>
  where
    T: Serialize + DeserializeOwned,
  {
    let key = presets
      .cache_key
      .unwrap_or_else(|| derived_cache_key(function, &params));
    debug!(
      function,
      key = %key,
      query = presets.description.as_deref().unwrap_or(function),
      use_cache = presets.get_from_cache,
      "web service read"
    );
    let transport = Arc::clone(&self.transport);

    self
      .cache
      .read(&key, presets.get_from_cache, || async move {
        let value = transport.call(function, params).await?;
        Ok(api_types::reserialize(function, value)?)
      })
      .await
  }

  /// Mutating call, never cached.
  pub async fn write<T: DeserializeOwned>(&self, function: &str, params: Value) -> Result<T, SyncError> {
    let value = self.transport.call(function, params).await?;
    Ok(api_types::reserialize(function, value)?)
  }

  pub fn invalidate_ws_cache_for_key(&self, key: &str) -> Result<(), SyncError> {
    self.cache.invalidate(key)
  }

  pub fn invalidate_ws_cache_for_key_starting_with(&self, prefix: &str) -> Result<(), SyncError> {
    self.cache.invalidate_prefix(prefix)
  }

  /// Whether the site exposes a web-service function to this user.
  pub fn ws_available(&self, function: &str) -> bool {
    self.info.functions.iter().any(|f| f.name == function)
  }

  /// Make a plugin file URL usable without a browser session.
  pub fn fix_pluginfile_url(&self, url: &str) -> String {
    fix_pluginfile_url(url, &self.token)
  }
}

/// Key for reads issued without an explicit one.
///
/// `serde_json` keeps object keys sorted, so equal parameters always
/// serialize identically.
pub fn derived_cache_key(function: &str, params: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(function.as_bytes());
  hasher.update(b":");
  hasher.update(params.to_string().as_bytes());
  format!("ws:{}:{}", function, hex::encode(hasher.finalize()))
}

/// Route a `pluginfile.php` URL through the web-service endpoint and append
/// the token. Other URLs are returned unchanged.
pub fn fix_pluginfile_url(url: &str, token: &str) -> String {
  if !url.contains("pluginfile.php") {
    return url.to_string();
  }
  let mut parsed = match Url::parse(url) {
    Ok(parsed) => parsed,
    Err(_) => return url.to_string(),
  };

  if !parsed.path().contains("/webservice/pluginfile.php") {
    let path = parsed.path().replacen("/pluginfile.php", "/webservice/pluginfile.php", 1);
    parsed.set_path(&path);
  }
  if !parsed.query_pairs().any(|(k, _)| k == "token") {
    parsed.query_pairs_mut().append_pair("token", token);
  }
  parsed.to_string()
}
