//! Replays queued actions against the server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::api::client::ApiClient;
use crate::api::types::id_to_string;
use crate::cache::{Cache, KvStorage};
use crate::classify::{ErrorHandler, Presenter};
use crate::error::ApiError;
use crate::net::{Connectivity, StaticConnectivity};
use crate::queue::{Action, DrainResult, PendingAction, PendingQueue};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
  /// Set when the pass was skipped because the device is offline.
  pub offline: bool,
  pub results: Vec<DrainResult>,
  /// Assignments that a replayed completion reported as fully done.
  pub completed_assignments: Vec<String>,
}

impl SyncReport {
  fn skipped_offline() -> Self {
    Self {
      offline: true,
      ..Self::default()
    }
  }

  pub fn succeeded(&self) -> usize {
    self.results.iter().filter(|r| r.success).count()
  }

  pub fn failed(&self) -> usize {
    self.results.len() - self.succeeded()
  }
}

/// Stable key for a pending action, sent so the server can drop duplicates
/// when a replay is retried after the first attempt actually went through.
pub fn idempotency_key(action: &PendingAction) -> String {
  let mut hasher = Sha256::new();
  hasher.update(action.id.as_bytes());
  hasher.update(b":");
  hasher.update(action.action.as_bytes());
  hasher.update(b":");
  hasher.update(action.payload.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

/// Drains the pending queue through the API client.
///
/// Every failed replay goes through the shared [`ErrorHandler`], so a
/// rejected token ends the session here just as it does for direct calls.
pub struct SyncCoordinator<S: KvStorage, C: Connectivity, P: Presenter> {
  client: ApiClient,
  cache: Cache<S>,
  queue: PendingQueue<S>,
  connectivity: C,
  errors: Arc<ErrorHandler<S, C, P>>,
}

impl<S: KvStorage, C: Connectivity, P: Presenter> SyncCoordinator<S, C, P> {
  pub fn new(
    client: ApiClient,
    cache: Cache<S>,
    queue: PendingQueue<S>,
    connectivity: C,
    errors: Arc<ErrorHandler<S, C, P>>,
  ) -> Self {
    Self {
      client,
      cache,
      queue,
      connectivity,
      errors,
    }
  }

  /// Replay one action. The token is read fresh for every action.
  async fn execute(&self, pending: PendingAction) -> Result<Value, ApiError> {
    let action = Action::from_pending(&pending)?;
    let session = self.cache.load_session().ok_or(ApiError::NotSignedIn)?;
    let key = idempotency_key(&pending);

    match action {
      Action::CompleteTask { task_id } => {
        let response = self
          .client
          .complete_task(&session.token, &task_id, Some(&key))
          .await?;
        serde_json::to_value(response).map_err(|e| ApiError::Decode(e.to_string()))
      }
      Action::StartAssignment { assignment_id } => {
        self
          .client
          .start_assignment(&session.token, &assignment_id, Some(&key))
          .await
      }
    }
  }

  async fn replay(&self, pending: PendingAction) -> Result<Value, ApiError> {
    let result = self.execute(pending).await;
    if let Err(e) = &result {
      // Passes only start once the oracle has said online
      self.errors.handle_checked(e, "sync", false, true);
    }
    result
  }

  /// Run one sync pass. Offline means a report with `offline` set and no
  /// results.
  pub async fn run(&self) -> SyncReport {
    let online = self.connectivity.is_online().await;
    self.pass(online).await
  }

  async fn pass(&self, online: bool) -> SyncReport {
    if !online {
      info!("Skipping sync: device is offline");
      return SyncReport::skipped_offline();
    }

    // Reuse the answer the caller already got instead of probing again
    let checked = StaticConnectivity::new(true);
    let results = self
      .queue
      .drain(&checked, |pending| self.replay(pending))
      .await;

    let completed_assignments = results
      .iter()
      .filter(|r| r.success && r.action.action == Action::COMPLETE_TASK)
      .filter_map(|r| {
        let result = r.result.as_ref()?;
        if !result.get("assignment_completed")?.as_bool()? {
          return None;
        }
        // Older servers omit the assignment id; name it by the task instead
        result.get("assignment_id").and_then(id_to_string).or_else(|| {
          let task_id = r.action.payload.get("task_id").and_then(id_to_string)?;
          Some(format!("(via task {})", task_id))
        })
      })
      .collect();

    let report = SyncReport {
      offline: false,
      results,
      completed_assignments,
    };

    if !report.results.is_empty() {
      info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Sync pass finished"
      );
    }

    report
  }

  /// Poll connectivity every `interval` and sync on each tick that finds the
  /// device online with actions waiting. `on_report` gets every non-empty
  /// report. Runs until Ctrl-C.
  pub async fn watch<F>(&self, interval: Duration, on_report: F)
  where
    F: FnMut(&SyncReport),
  {
    self
      .watch_until(interval, on_report, tokio::signal::ctrl_c())
      .await
  }

  /// [`watch`](Self::watch), stopping when `shutdown` completes.
  pub async fn watch_until<F, Fut>(&self, interval: Duration, mut on_report: F, shutdown: Fut)
  where
    F: FnMut(&SyncReport),
    Fut: Future,
  {
    let mut ticker = tokio::time::interval(interval);
    tokio::pin!(shutdown);
    let mut was_online = false;

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        _ = &mut shutdown => {
          info!("Stopping sync watch");
          return;
        }
      }

      let online = self.connectivity.is_online().await;
      if online && !was_online {
        info!("Connectivity available");
      } else if !online && was_online {
        warn!("Connectivity lost");
      }
      was_online = online;

      if !online || self.queue.is_empty() {
        continue;
      }
      if self.cache.load_session().is_none() {
        debug!("Not signed in, leaving pending actions queued");
        continue;
      }

      let report = self.pass(true).await;
      if !report.results.is_empty() {
        on_report(&report);
      }
    }
  }
}
