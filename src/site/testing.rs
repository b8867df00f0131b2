//! Scripted web-service transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::client::WsTransport;
use super::api_types::SiteFunction;
use super::{Site, SiteInfo};
use crate::cache::{ResponseCache, SqliteStorage};
use crate::db::Database;
use crate::error::TransportError;

#[derive(Debug, Clone)]
enum Scripted {
  Ok(Value),
  Network(String),
  Remote(String),
}

#[derive(Default)]
struct Inner {
  /// Queued answers per function; the last one repeats
  scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
  calls: Mutex<Vec<(String, Value)>>,
}

/// Transport answering from per-function scripts and recording every call.
#[derive(Clone, Default)]
pub struct FakeTransport {
  inner: Arc<Inner>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handle(&self) -> Arc<dyn WsTransport> {
    Arc::new(self.clone())
  }

  /// Replace the script for `function` with a single answer.
  pub fn respond(&self, function: &str, value: Value) {
    self.set(function, Scripted::Ok(value));
  }

  /// Make `function` fail as if the network were down.
  pub fn fail(&self, function: &str, reason: &str) {
    self.set(function, Scripted::Network(reason.to_string()));
  }

  /// Make `function` fail with a site exception carrying `message`.
  pub fn fail_remote(&self, function: &str, message: &str) {
    self.set(function, Scripted::Remote(message.to_string()));
  }

  /// Queue an answer after the current ones.
  pub fn then_respond(&self, function: &str, value: Value) {
    self.push(function, Scripted::Ok(value));
  }

  pub fn then_fail(&self, function: &str, reason: &str) {
    self.push(function, Scripted::Network(reason.to_string()));
  }

  pub fn calls_to(&self, function: &str) -> usize {
    self
      .inner
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(f, _)| f == function)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.inner.calls.lock().unwrap().len()
  }

  pub fn last_params(&self, function: &str) -> Option<Value> {
    self
      .inner
      .calls
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|(f, _)| f == function)
      .map(|(_, p)| p.clone())
  }

  fn set(&self, function: &str, scripted: Scripted) {
    let mut scripts = self.inner.scripts.lock().unwrap();
    scripts.insert(function.to_string(), VecDeque::from(vec![scripted]));
  }

  fn push(&self, function: &str, scripted: Scripted) {
    let mut scripts = self.inner.scripts.lock().unwrap();
    scripts
      .entry(function.to_string())
      .or_default()
      .push_back(scripted);
  }
}

#[async_trait]
impl WsTransport for FakeTransport {
  async fn call(&self, function: &str, params: Value) -> Result<Value, TransportError> {
    self
      .inner
      .calls
      .lock()
      .unwrap()
      .push((function.to_string(), params));

    let next = {
      let mut scripts = self.inner.scripts.lock().unwrap();
      match scripts.get_mut(function) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
      }
    };

    match next {
      Some(Scripted::Ok(value)) => Ok(value),
      Some(Scripted::Network(reason)) => Err(TransportError::Network(reason)),
      Some(Scripted::Remote(message)) => Err(TransportError::Remote {
        errorcode: None,
        message,
      }),
      None => Err(TransportError::Network(format!("no script for {}", function))),
    }
  }
}

/// Site for user 2 on an in-memory cache, backed by `transport`.
pub fn test_site(transport: &FakeTransport) -> Site {
  let db = Database::open_in_memory().unwrap();
  let cache = ResponseCache::new(SqliteStorage::new(db));
  let info = SiteInfo {
    sitename: "Test campus".to_string(),
    userid: 2,
    siteurl: "https://campus.example.edu".to_string(),
    functions: vec![SiteFunction {
      name: "mod_certificate_get_certificates_by_courses".to_string(),
      version: String::new(),
    }],
    ..SiteInfo::default()
  };
  Site::new(
    "test",
    "https://campus.example.edu",
    "secret",
    info,
    transport.handle(),
    cache,
  )
}
