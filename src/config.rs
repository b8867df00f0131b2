use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::sync::{EntityType, ErrorMessages};

const APP_DIR: &str = "lms-sync";
const LOCAL_CONFIG: &str = "lms-sync.yaml";
const CONFIG_ENV: &str = "LMS_SYNC_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub site: SiteConfig,
  #[serde(default)]
  pub files: FilesConfig,
  /// Default error messages per entity, merged over the built-in ones
  #[serde(default, deserialize_with = "deserialize_error_messages")]
  pub errors: ErrorMessages,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
  pub url: String,
  /// Directory name of the site's local data (defaults to the site host)
  pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
  /// Keep downloaded files on this device
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Where downloaded files go (defaults to the site's data directory)
  pub dir: Option<PathBuf>,
}

impl Default for FilesConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      dir: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset, e.g. "debug" or "lms_sync=trace"
  pub level: Option<String>,
}

fn default_true() -> bool {
  true
}

fn deserialize_error_messages<'de, D>(deserializer: D) -> Result<ErrorMessages, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let overrides: HashMap<EntityType, String> = HashMap::deserialize(deserializer)?;
  Ok(ErrorMessages::with_overrides(overrides))
}

impl Config {
  /// Load the configuration of the site to sync.
  ///
  /// An explicit path must exist. Otherwise the first existing file of
  /// `candidates()` is used.
  pub fn load(explicit: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit {
      if !path.is_file() {
        return Err(eyre!("Config file not found: {}", path.display()));
      }
      return Self::load_from_path(path);
    }

    let candidates = Self::candidates();
    match candidates.iter().find(|p| p.is_file()) {
      Some(path) => Self::load_from_path(path),
      None => {
        let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(eyre!(
          "No configuration file found (searched {}). See config.example.yaml for the format.",
          searched.join(", ")
        ))
      }
    }
  }

  /// Files searched for a configuration: `$LMS_SYNC_CONFIG`, `./lms-sync.yaml`,
  /// then `$XDG_CONFIG_HOME/lms-sync/config.yaml`.
  fn candidates() -> Vec<PathBuf> {
    std::env::var_os(CONFIG_ENV)
      .map(PathBuf::from)
      .into_iter()
      .chain(std::iter::once(PathBuf::from(LOCAL_CONFIG)))
      .chain(dirs::config_dir().map(|d| d.join(APP_DIR).join("config.yaml")))
      .collect()
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Url::parse(&config.site.url).map_err(|e| eyre!("Invalid site url {}: {}", config.site.url, e))?;
    Ok(config)
  }

  /// Get the web-service token from environment variables.
  ///
  /// Checks LMS_SYNC_TOKEN first, then MOODLE_TOKEN as fallback.
  pub fn get_token() -> Result<String> {
    std::env::var("LMS_SYNC_TOKEN")
      .or_else(|_| std::env::var("MOODLE_TOKEN"))
      .map_err(|_| {
        eyre!("Web service token not found. Set LMS_SYNC_TOKEN or MOODLE_TOKEN environment variable.")
      })
  }

  /// Identifier of the site: the configured id, else the host of its url.
  pub fn site_id(&self) -> String {
    if let Some(id) = &self.site.id {
      return id.clone();
    }
    Url::parse(&self.site.url)
      .ok()
      .and_then(|u| u.host_str().map(String::from))
      .unwrap_or_else(|| "default".to_string())
  }

  /// `<data dir>/lms-sync/<site id>`
  pub fn data_dir(&self) -> Result<PathBuf> {
    dirs::data_dir()
      .map(|d| d.join(APP_DIR).join(self.site_id()))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("cache.db"))
  }

  pub fn files_dir(&self) -> Result<PathBuf> {
    match &self.files.dir {
      Some(dir) => Ok(dir.clone()),
      None => Ok(self.data_dir()?.join("files")),
    }
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("logs"))
  }
}
