use thiserror::Error;

/// Failure of a web-service call.
#[derive(Error, Debug)]
pub enum TransportError {
  /// The site answered with an exception object.
  #[error("{message}")]
  Remote {
    errorcode: Option<String>,
    message: String,
  },

  #[error("Network error: {0}")]
  Network(String),

  #[error("Unexpected status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl TransportError {
  pub fn from_status(status: u16, body: &str) -> Self {
    let body = if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      let mut end = MAX_ERROR_BODY_LENGTH;
      while !body.is_char_boundary(end) {
        end -= 1;
      }
      format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    };
    TransportError::Status { status, body }
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(e: reqwest::Error) -> Self {
    TransportError::Network(e.to_string())
  }
}

/// Failure to fetch a file into local storage.
#[derive(Error, Debug)]
pub enum DownloadError {
  #[error("Network error while downloading {url}: {reason}")]
  Network { url: String, reason: String },

  #[error("Download of {url} failed with status {status}")]
  Status { url: String, status: u16 },

  #[error("Failed to write {path}: {reason}")]
  Write { path: String, reason: String },
}

/// Everything a sync operation can fail with.
#[derive(Error, Debug)]
pub enum SyncError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error(transparent)]
  Download(#[from] DownloadError),

  /// A well-formed answer that holds nothing usable.
  #[error("{}", .0.as_deref().unwrap_or("Nothing found"))]
  EmptyResult(Option<String>),

  /// Neither a plan nor a course id was given.
  #[error("Request has neither a plan nor a course to address")]
  Unaddressable,

  #[error("Cache storage failure: {0}")]
  Storage(String),
}

impl SyncError {
  /// Message meant for the user, when the failure carries one.
  ///
  /// Remote exceptions and explicit "nothing found" conditions do; transport
  /// and storage failures fall back to the entity's default message.
  pub fn user_message(&self) -> Option<&str> {
    match self {
      SyncError::Transport(TransportError::Remote { message, .. }) => Some(message),
      SyncError::EmptyResult(message) => message.as_deref(),
      _ => None,
    }
  }

  /// Errors that must not go through the retry-without-cache path.
  pub fn is_fatal(&self) -> bool {
    matches!(self, SyncError::Unaddressable)
  }

  pub fn empty() -> Self {
    SyncError::EmptyResult(None)
  }
}
