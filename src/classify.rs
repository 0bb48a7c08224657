//! Failure classification and central handling of remote-call errors.

use std::fmt;

use tracing::error;

use crate::cache::{Cache, KvStorage};
use crate::error::ApiError;
use crate::net::Connectivity;

/// Closed set of failure kinds shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Network,
  Auth,
  Server,
  Validation,
  Timeout,
  Offline,
  Unknown,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Network => "NETWORK_ERROR",
      ErrorKind::Auth => "AUTHENTICATION_ERROR",
      ErrorKind::Server => "SERVER_ERROR",
      ErrorKind::Validation => "VALIDATION_ERROR",
      ErrorKind::Timeout => "TIMEOUT_ERROR",
      ErrorKind::Offline => "OFFLINE_ERROR",
      ErrorKind::Unknown => "UNKNOWN_ERROR",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
  pub kind: ErrorKind,
  pub message: String,
}

/// Map a failure to its kind. `online` is the connectivity oracle's answer.
///
/// Order matters: connectivity is checked before status codes, and
/// status codes before timeouts.
pub fn classify_kind(error: Option<&ApiError>, online: bool) -> ErrorKind {
  let Some(error) = error else {
    return ErrorKind::Unknown;
  };

  let status = error.status();
  let text = error.to_string();

  if !online || (status.is_none() && (text.contains("network") || text.contains("Network"))) {
    return ErrorKind::Network;
  }

  if let Some(status) = status {
    if status == 401 || status == 403 {
      return ErrorKind::Auth;
    }
    if (400..500).contains(&status) {
      return ErrorKind::Validation;
    }
    if status >= 500 {
      return ErrorKind::Server;
    }
  }

  if error.is_timeout() || text.contains("timeout") {
    return ErrorKind::Timeout;
  }

  ErrorKind::Unknown
}

/// User-facing message for a kind. Validation prefers the server's message.
pub fn describe(kind: ErrorKind, error: Option<&ApiError>) -> String {
  match kind {
    ErrorKind::Network => {
      "Unable to connect to the server. Please check your internet connection.".to_string()
    }
    ErrorKind::Auth => "Your session has expired. Please sign in again.".to_string(),
    ErrorKind::Server => "Something went wrong on our end. Please try again later.".to_string(),
    ErrorKind::Validation => error
      .and_then(ApiError::server_message)
      .map(String::from)
      .unwrap_or_else(|| "Please check your information and try again.".to_string()),
    ErrorKind::Timeout => "The request timed out. Please try again.".to_string(),
    ErrorKind::Offline => "You're offline. Some features may be limited.".to_string(),
    ErrorKind::Unknown => "An unexpected error occurred. Please try again.".to_string(),
  }
}

pub fn classify(error: Option<&ApiError>, online: bool) -> ErrorClassification {
  let kind = classify_kind(error, online);
  ErrorClassification {
    kind,
    message: describe(kind, error),
  }
}

/// Where handled errors surface to the user.
pub trait Presenter: Send + Sync {
  fn alert(&self, title: &str, message: &str);

  /// Send the user back to sign in after the session was dropped.
  fn redirect_to_login(&self);
}

/// Classifies failures, logs them, and reacts: an auth failure drops the
/// session and redirects to login; anything else becomes an alert.
pub struct ErrorHandler<S: KvStorage, C: Connectivity, P: Presenter> {
  cache: Cache<S>,
  connectivity: C,
  presenter: P,
}

impl<S: KvStorage, C: Connectivity, P: Presenter> ErrorHandler<S, C, P> {
  pub fn new(cache: Cache<S>, connectivity: C, presenter: P) -> Self {
    Self {
      cache,
      connectivity,
      presenter,
    }
  }

  pub fn presenter(&self) -> &P {
    &self.presenter
  }

  pub async fn handle(
    &self,
    error: &ApiError,
    context: &str,
    show_alert: bool,
  ) -> ErrorClassification {
    let online = self.connectivity.is_online().await;
    self.handle_checked(error, context, show_alert, online)
  }

  /// Like [`handle`](Self::handle), for callers that already asked the
  /// connectivity oracle.
  pub fn handle_checked(
    &self,
    error: &ApiError,
    context: &str,
    show_alert: bool,
    online: bool,
  ) -> ErrorClassification {
    let classification = classify(Some(error), online);

    error!(context, kind = %classification.kind, error = %error, "Request failed");

    if classification.kind == ErrorKind::Auth {
      if !self.cache.clear_session() {
        error!(context = "auth-logout", "Failed to clear session");
      }
      self.presenter.redirect_to_login();
      return classification;
    }

    if show_alert {
      self.presenter.alert("Error", &classification.message);
    }

    classification
  }
}

#[cfg(test)]
pub mod testing {
  use super::Presenter;
  use std::sync::{Arc, Mutex};

  /// Presenter that records what it was asked to show.
  #[derive(Clone, Default)]
  pub struct RecordingPresenter {
    pub alerts: Arc<Mutex<Vec<(String, String)>>>,
    pub redirects: Arc<Mutex<usize>>,
  }

  impl RecordingPresenter {
    pub fn alert_titles(&self) -> Vec<String> {
      self
        .alerts
        .lock()
        .unwrap()
        .iter()
        .map(|(title, _)| title.clone())
        .collect()
    }

    pub fn redirect_count(&self) -> usize {
      *self.redirects.lock().unwrap()
    }
  }

  impl Presenter for RecordingPresenter {
    fn alert(&self, title: &str, message: &str) {
      self
        .alerts
        .lock()
        .unwrap()
        .push((title.to_string(), message.to_string()));
    }

    fn redirect_to_login(&self) {
      *self.redirects.lock().unwrap() += 1;
    }
  }
}
