//! Wire types shared by every web-service call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Answer of `core_webservice_get_site_info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteInfo {
  #[serde(default)]
  pub sitename: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub fullname: String,
  pub userid: i64,
  #[serde(default)]
  pub siteurl: String,
  #[serde(default)]
  pub functions: Vec<SiteFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteFunction {
  pub name: String,
  #[serde(default)]
  pub version: String,
}

/// Exception object returned in place of a result.
#[derive(Debug, Deserialize)]
struct WsException {
  exception: String,
  #[serde(default)]
  errorcode: Option<String>,
  #[serde(default)]
  message: Option<String>,
}

/// Turn an exception payload into a `TransportError::Remote`.
///
/// Returns `None` for ordinary results, including arrays and scalars.
pub fn exception_from_value(value: &Value) -> Option<TransportError> {
  let object = value.as_object()?;
  if !object.contains_key("exception") {
    return None;
  }
  let exception: WsException = serde_json::from_value(value.clone()).ok()?;
  Some(TransportError::Remote {
    message: exception
      .message
      .unwrap_or_else(|| exception.exception.clone()),
    errorcode: exception.errorcode,
  })
}

/// Reserialize a JSON value into a typed response.
pub fn reserialize<T: serde::de::DeserializeOwned>(
  function: &str,
  value: Value,
) -> Result<T, TransportError> {
  serde_json::from_value(value)
    .map_err(|e| TransportError::InvalidResponse(format!("{}: {}", function, e)))
}
