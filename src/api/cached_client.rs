//! API client with offline support.
//!
//! Reads go to the server when the device is online and fall back to the
//! local cache otherwise. Mutations that cannot reach the server are
//! recorded in the pending-action queue for later replay.

use futures::future::try_join;
use tracing::{info, warn};

use crate::cache::{Cache, KvStorage};
use crate::error::{ApiError, ApiResult};
use crate::net::Connectivity;
use crate::queue::{Action, PendingQueue};

use super::client::ApiClient;
use super::types::{Assignment, CompleteTaskResponse, Session, Task};

/// Where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Fresh data from the server
  Network,
  /// Server unreachable, serving the last cached copy
  Offline,
}

/// Data plus its origin.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub source: Source,
}

impl<T> Fetched<T> {
  fn network(data: T) -> Self {
    Self {
      data,
      source: Source::Network,
    }
  }

  fn offline(data: T) -> Self {
    Self {
      data,
      source: Source::Offline,
    }
  }
}

/// Result of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
  /// The server confirmed the change.
  Applied(T),
  /// The server was unreachable; the change waits in the pending queue.
  Queued { persisted: bool },
}

const OFFLINE: &str = "device is offline";

/// Whether a failure means "could not talk to the server" (as opposed to the
/// server answering with an error).
fn is_unreachable(error: &ApiError) -> bool {
  matches!(error, ApiError::Network(_) | ApiError::Timeout(_))
}

/// The API client wired to the local cache and the pending-action queue.
pub struct CachedApiClient<S: KvStorage, C: Connectivity> {
  inner: ApiClient,
  cache: Cache<S>,
  queue: PendingQueue<S>,
  connectivity: C,
}

impl<S: KvStorage, C: Connectivity> CachedApiClient<S, C> {
  pub fn new(inner: ApiClient, cache: Cache<S>, queue: PendingQueue<S>, connectivity: C) -> Self {
    Self {
      inner,
      cache,
      queue,
      connectivity,
    }
  }

  #[cfg(test)]
  pub fn cache(&self) -> &Cache<S> {
    &self.cache
  }

  pub fn queue(&self) -> &PendingQueue<S> {
    &self.queue
  }

  pub fn connectivity(&self) -> &C {
    &self.connectivity
  }

  /// The stored session, read fresh from the cache.
  pub fn session(&self) -> ApiResult<Session> {
    self.cache.load_session().ok_or(ApiError::NotSignedIn)
  }

  /// Sign in and store the session.
  pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
    let session = self.inner.login(email, password).await?;
    if !self.cache.save_session(&session) {
      warn!("Signed in but the session could not be stored");
    }
    info!(user = session.user.display_name(), "Signed in");
    Ok(session)
  }

  pub fn logout(&self) -> bool {
    self.cache.clear_session()
  }

  /// Assignments for the signed-in user's team.
  pub async fn assignments(&self) -> ApiResult<Fetched<Vec<Assignment>>> {
    let session = self.session()?;

    let failure = if self.connectivity.is_online().await {
      let team_id = session.user.team_id.clone().unwrap_or_default();
      match self.inner.get_assignments(&session.token, &team_id).await {
        Ok(assignments) => {
          self.cache.cache_assignments(&assignments);
          return Ok(Fetched::network(assignments));
        }
        Err(e) if is_unreachable(&e) => e,
        Err(e) => return Err(e),
      }
    } else {
      ApiError::Network(OFFLINE.to_string())
    };

    match self.cache.cached_assignments() {
      Some(cached) => {
        warn!(error = %failure, "Serving cached assignments");
        Ok(Fetched::offline(cached))
      }
      None => Err(failure),
    }
  }

  /// One assignment with its tasks.
  pub async fn assignment(
    &self,
    assignment_id: &str,
  ) -> ApiResult<Fetched<(Assignment, Vec<Task>)>> {
    let session = self.session()?;

    let failure = if self.connectivity.is_online().await {
      let fetched = try_join(
        self.inner.get_assignment(&session.token, assignment_id),
        self.inner.get_tasks(&session.token, assignment_id),
      )
      .await;

      match fetched {
        Ok((assignment, tasks)) => {
          self.cache.cache_tasks(assignment_id, &tasks);
          return Ok(Fetched::network((assignment, tasks)));
        }
        Err(e) if is_unreachable(&e) => e,
        Err(e) => return Err(e),
      }
    } else {
      ApiError::Network(OFFLINE.to_string())
    };

    let cached = self
      .cache
      .cached_assignments()
      .and_then(|all| all.into_iter().find(|a| a.id == assignment_id));
    match cached {
      Some(assignment) => {
        warn!(assignment_id, error = %failure, "Serving cached assignment");
        let tasks = self.cache.cached_tasks(assignment_id);
        Ok(Fetched::offline((assignment, tasks)))
      }
      None => Err(failure),
    }
  }

  /// Complete a task, queueing it when the server cannot be reached.
  pub async fn complete_task(
    &self,
    task_id: &str,
  ) -> ApiResult<MutationOutcome<CompleteTaskResponse>> {
    let session = self.session()?;
    let action = Action::CompleteTask {
      task_id: task_id.to_string(),
    };

    if !self.connectivity.is_online().await {
      return Ok(self.defer(&action).await);
    }

    match self.inner.complete_task(&session.token, task_id, None).await {
      Ok(response) => {
        self.cache.mark_task_completed(task_id);
        Ok(MutationOutcome::Applied(response))
      }
      Err(e) if is_unreachable(&e) => {
        warn!(task_id, error = %e, "Could not complete task, queueing");
        Ok(self.defer(&action).await)
      }
      Err(e) => Err(e),
    }
  }

  /// Start an assignment, queueing it when the server cannot be reached.
  pub async fn start_assignment(&self, assignment_id: &str) -> ApiResult<MutationOutcome<()>> {
    let session = self.session()?;
    let action = Action::StartAssignment {
      assignment_id: assignment_id.to_string(),
    };

    if !self.connectivity.is_online().await {
      return Ok(self.defer(&action).await);
    }

    match self
      .inner
      .start_assignment(&session.token, assignment_id, None)
      .await
    {
      Ok(_) => {
        self.cache.mark_assignment_started(assignment_id);
        Ok(MutationOutcome::Applied(()))
      }
      Err(e) if is_unreachable(&e) => {
        warn!(assignment_id, error = %e, "Could not start assignment, queueing");
        Ok(self.defer(&action).await)
      }
      Err(e) => Err(e),
    }
  }

  /// Queue the action and apply it to the cached copy so the local view
  /// reflects it until the replay happens.
  async fn defer<T>(&self, action: &Action) -> MutationOutcome<T> {
    let persisted = self.queue.enqueue_action(action).await;
    match action {
      Action::CompleteTask { task_id } => {
        self.cache.mark_task_completed(task_id);
      }
      Action::StartAssignment { assignment_id } => {
        self.cache.mark_assignment_started(assignment_id);
      }
    }
    MutationOutcome::Queued { persisted }
  }
}
