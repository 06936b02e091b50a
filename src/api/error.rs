//! Error type for calls against the rental REST API.

use thiserror::Error;

/// Failure of a single API call.
///
/// Clonable so a single in-flight response can be shared by every caller
/// waiting on the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// No response was received (connection refused, DNS, TLS, reset)
  #[error("network error: {0}")]
  Transport(String),
  /// The request exceeded its timeout
  #[error("request timed out")]
  Timeout,
  /// The server answered with a non-success status
  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },
  /// The response body did not match the expected shape
  #[error("unexpected response: {0}")]
  Decode(String),
  /// The request URL could not be built
  #[error("invalid request url: {0}")]
  Url(String),
}

impl ApiError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, ApiError::Status { status: 404, .. })
  }

  /// Short text suitable for an inline alert.
  pub fn user_message(&self) -> String {
    match self {
      ApiError::Transport(_) => "could not reach the server".to_string(),
      ApiError::Timeout => "the server took too long to respond".to_string(),
      ApiError::Status { status: 404, .. } => "not found".to_string(),
      ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
      ApiError::Status { status, .. } => format!("server error ({})", status),
      ApiError::Decode(_) => "the server sent an unexpected response".to_string(),
      ApiError::Url(e) => format!("invalid request ({})", e),
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ApiError::Timeout
    } else if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
      ApiError::Status {
        status: status.as_u16(),
        message: String::new(),
      }
    } else {
      ApiError::Transport(e.to_string())
    }
  }
}

impl From<url::ParseError> for ApiError {
  fn from(e: url::ParseError) -> Self {
    ApiError::Url(e.to_string())
  }
}

/// Extract a human-readable message from an error response body.
///
/// FastAPI answers with `{"detail": "..."}` or `{"detail": [{"msg": ...}]}`,
/// other handlers with `{"message": "..."}`; anything else is used verbatim.
pub(crate) fn message_from_body(body: &str) -> String {
  let value: serde_json::Value = match serde_json::from_str(body) {
    Ok(v) => v,
    Err(_) => return body.trim().to_string(),
  };

  if let Some(detail) = value.get("detail") {
    if let Some(s) = detail.as_str() {
      return s.to_string();
    }
    if let Some(items) = detail.as_array() {
      let msgs: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
        .collect();
      if !msgs.is_empty() {
        return msgs.join("; ");
      }
    }
  }

  if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
    return message.to_string();
  }

  body.trim().to_string()
}
