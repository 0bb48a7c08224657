//! HTTP client for the assignment service.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

use super::types::{Assignment, CompleteTaskResponse, LoginResponse, Session, Task};

/// Header carrying the session token on authenticated calls.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Header carrying a stable key for replayed mutations.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Client for the assignment REST API.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base_url: String,
}

impl ApiClient {
  pub fn new(base_url: &str, timeout: Duration) -> color_eyre::Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
      USER_AGENT,
      HeaderValue::from_static(concat!("fieldq/", env!("CARGO_PKG_VERSION"))),
    );

    let client = Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  fn request(&self, method: Method, endpoint: &str, token: Option<&str>) -> RequestBuilder {
    let url = format!("{}{}", self.base_url, endpoint);
    let builder = self.client.request(method, url);
    match token {
      Some(token) => builder.header(AUTH_HEADER, token),
      None => builder,
    }
  }

  /// Send a request and decode a JSON body, mapping failures to `ApiError`.
  async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> ApiResult<T> {
    let response = builder.send().await?;
    let response = Self::check_response(response).await?;
    let body = response.bytes().await?;

    if body.is_empty() {
      // Some mutations answer with no body
      return serde_json::from_value(Value::Null).map_err(|e| ApiError::Decode(e.to_string()));
    }
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
  }

  /// Turn a non-success status into `ApiError::Status`, pulling the server's
  /// `message` or `error` field out of the body when there is one.
  async fn check_response(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body: Option<Value> = response.json().await.ok();
    let message = body.as_ref().and_then(|b| {
      b.get("message")
        .or_else(|| b.get("error"))
        .and_then(Value::as_str)
        .map(String::from)
    });

    debug!(status = status.as_u16(), ?message, "Request rejected");

    Err(ApiError::Status {
      status: status.as_u16(),
      message,
    })
  }

  /// Sign in. Only technicians may use this client.
  pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
    let builder = self
      .request(Method::POST, "/auth/login", None)
      .json(&json!({ "email": email, "password": password }));
    let response: LoginResponse = Self::send(builder).await?;

    if !response.user.is_technician() {
      return Err(ApiError::AccessDenied);
    }

    Ok(Session {
      token: response.token,
      user: response.user,
    })
  }

  /// Assignments for a team.
  pub async fn get_assignments(&self, token: &str, team_id: &str) -> ApiResult<Vec<Assignment>> {
    let builder = self
      .request(Method::GET, "/assignments", Some(token))
      .query(&[("team_id", team_id)]);
    Self::send(builder).await
  }

  pub async fn get_assignment(&self, token: &str, assignment_id: &str) -> ApiResult<Assignment> {
    let builder = self.request(
      Method::GET,
      &format!("/assignments/{}", assignment_id),
      Some(token),
    );
    Self::send(builder).await
  }

  pub async fn get_tasks(&self, token: &str, assignment_id: &str) -> ApiResult<Vec<Task>> {
    let builder = self.request(
      Method::GET,
      &format!("/tasks/assignment/{}", assignment_id),
      Some(token),
    );
    Self::send(builder).await
  }

  /// Mark a task complete. `idempotency_key` is sent on replays.
  pub async fn complete_task(
    &self,
    token: &str,
    task_id: &str,
    idempotency_key: Option<&str>,
  ) -> ApiResult<CompleteTaskResponse> {
    let mut builder = self
      .request(
        Method::PATCH,
        &format!("/tasks/{}/complete", task_id),
        Some(token),
      )
      .json(&json!({}));
    if let Some(key) = idempotency_key {
      builder = builder.header(IDEMPOTENCY_HEADER, key);
    }
    let response: Option<CompleteTaskResponse> = Self::send(builder).await?;
    Ok(response.unwrap_or_default())
  }

  /// Mark an assignment as in progress.
  pub async fn start_assignment(
    &self,
    token: &str,
    assignment_id: &str,
    idempotency_key: Option<&str>,
  ) -> ApiResult<Value> {
    let mut builder = self
      .request(
        Method::PATCH,
        &format!("/assignments/{}/start", assignment_id),
        Some(token),
      )
      .json(&json!({}));
    if let Some(key) = idempotency_key {
      builder = builder.header(IDEMPOTENCY_HEADER, key);
    }
    Self::send(builder).await
  }
}
