//! Typed errors for calls against the remote assignment service.
//!
//! Everything above the HTTP client works with `color_eyre::Result`; only the
//! remote calls return `ApiError` so the classifier can inspect the failure.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  /// The server answered with a non-success status.
  #[error("HTTP {status}: {}", message.as_deref().unwrap_or("request failed"))]
  Status {
    status: u16,
    /// `message` (or `error`) field from the response body, if any.
    message: Option<String>,
  },

  #[error("Network error: {0}")]
  Network(String),

  /// The HTTP client gave up waiting for a response.
  #[error("Request timeout: {0}")]
  Timeout(String),

  #[error("Failed to decode response: {0}")]
  Decode(String),

  #[error("Not signed in")]
  NotSignedIn,

  #[error("App for technicians only")]
  AccessDenied,

  #[error("Invalid pending action: {0}")]
  InvalidAction(String),
}

impl ApiError {
  /// HTTP status carried by this error, if the server responded at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Message supplied by the server in the response body.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      ApiError::Status { message, .. } => message.as_deref(),
      _ => None,
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, ApiError::Timeout(_))
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Timeout(err.to_string())
    } else if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::Status {
        status: status.as_u16(),
        message: None,
      }
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_display_uses_server_message() {
    let err = ApiError::Status {
      status: 422,
      message: Some("Task already completed".to_string()),
    };
    assert_eq!(err.to_string(), "HTTP 422: Task already completed");
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.server_message(), Some("Task already completed"));
  }

  #[test]
  fn test_status_display_without_message() {
    let err = ApiError::Status {
      status: 500,
      message: None,
    };
    assert_eq!(err.to_string(), "HTTP 500: request failed");
    assert_eq!(err.server_message(), None);
  }

  #[test]
  fn test_transport_errors_carry_no_status() {
    assert_eq!(ApiError::Network("refused".into()).status(), None);
    assert!(ApiError::Timeout("30s".into()).is_timeout());
    assert!(!ApiError::NotSignedIn.is_timeout());
  }
}
