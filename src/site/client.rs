use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::exception_from_value;
use crate::error::TransportError;

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Raw transport for web-service functions.
///
/// Knows nothing about caching: every call goes to the network.
#[async_trait]
pub trait WsTransport: Send + Sync {
  async fn call(&self, function: &str, params: Value) -> Result<Value, TransportError>;
}

/// REST web-service client
#[derive(Clone)]
pub struct HttpWsTransport {
  http: reqwest::Client,
  endpoint: Url,
  token: String,
}

impl HttpWsTransport {
  pub fn new(site_url: &str, token: &str) -> Result<Self, TransportError> {
    let endpoint = site_endpoint(site_url, "webservice/rest/server.php")?;
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()?;

    Ok(Self {
      http,
      endpoint,
      token: token.to_string(),
    })
  }
}

#[async_trait]
impl WsTransport for HttpWsTransport {
  async fn call(&self, function: &str, params: Value) -> Result<Value, TransportError> {
    let mut url = self.endpoint.clone();
    url
      .query_pairs_mut()
      .append_pair("moodlewsrestformat", "json")
      .append_pair("wsfunction", function);

    let mut form = flatten_params(&params);
    form.push(("wstoken".to_string(), self.token.clone()));

    debug!(function, "calling web service");
    let response = self.http.post(url).form(&form).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(TransportError::from_status(status.as_u16(), &body));
    }

    let body: Value = response
      .json()
      .await
      .map_err(|e| TransportError::InvalidResponse(format!("{}: {}", function, e)))?;

    if let Some(err) = exception_from_value(&body) {
      return Err(err);
    }

    Ok(body)
  }
}

/// Resolve `path` against the site root, keeping any sub-directory install.
pub fn site_endpoint(site_url: &str, path: &str) -> Result<Url, TransportError> {
  let base = if site_url.ends_with('/') {
    site_url.to_string()
  } else {
    format!("{}/", site_url)
  };
  Url::parse(&base)
    .and_then(|u| u.join(path))
    .map_err(|e| TransportError::InvalidResponse(format!("Invalid site url {}: {}", site_url, e)))
}

/// Flatten JSON parameters into REST form fields.
///
/// `{"courseids": [3, 4]}` becomes `courseids[0]=3&courseids[1]=4`; nested
/// objects use `name[key]`. Booleans are sent as 1/0, nulls are dropped.
pub fn flatten_params(params: &Value) -> Vec<(String, String)> {
  let mut out = Vec::new();
  if let Value::Object(map) = params {
    for (key, value) in map {
      flatten_into(key.clone(), value, &mut out);
    }
  }
  out
}

fn flatten_into(name: String, value: &Value, out: &mut Vec<(String, String)>) {
  match value {
    Value::Null => {}
    Value::Bool(b) => out.push((name, if *b { "1" } else { "0" }.to_string())),
    Value::Number(n) => out.push((name, n.to_string())),
    Value::String(s) => out.push((name, s.clone())),
    Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        flatten_into(format!("{}[{}]", name, i), item, out);
      }
    }
    Value::Object(map) => {
      for (key, item) in map {
        flatten_into(format!("{}[{}]", name, key), item, out);
      }
    }
  }
}
