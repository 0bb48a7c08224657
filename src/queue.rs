//! Durable queue of mutations waiting to be replayed against the server.
//!
//! The whole queue is one cache entry holding an ordered JSON array. Actions
//! are replayed oldest first and stay queued until their replay succeeds, so
//! delivery is at-least-once.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::types::id_to_string;
use crate::cache::{keys, Cache, KvStorage};
use crate::error::ApiError;
use crate::net::Connectivity;

/// A recorded user mutation not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  /// Milliseconds since the epoch. Not guaranteed unique.
  pub id: String,
  /// Discriminator such as `COMPLETE_TASK`.
  pub action: String,
  pub payload: Value,
  /// RFC 3339, UTC, millisecond precision.
  pub timestamp: String,
}

impl PendingAction {
  pub fn new(action: impl Into<String>, payload: Value) -> Self {
    let now = Utc::now();
    Self {
      id: now.timestamp_millis().to_string(),
      action: action.into(),
      payload,
      timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
  }
}

/// Typed view of a pending action, validated against the payload schema
/// of its discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  CompleteTask { task_id: String },
  StartAssignment { assignment_id: String },
}

impl Action {
  pub const COMPLETE_TASK: &'static str = "COMPLETE_TASK";
  pub const START_ASSIGNMENT: &'static str = "START_ASSIGNMENT";

  pub fn action_type(&self) -> &'static str {
    match self {
      Action::CompleteTask { .. } => Self::COMPLETE_TASK,
      Action::StartAssignment { .. } => Self::START_ASSIGNMENT,
    }
  }

  pub fn payload(&self) -> Value {
    match self {
      Action::CompleteTask { task_id } => json!({ "task_id": task_id }),
      Action::StartAssignment { assignment_id } => json!({ "assignment_id": assignment_id }),
    }
  }

  /// Parse and validate a stored action. Payloads written by an older
  /// build with a different shape are rejected rather than replayed.
  pub fn from_pending(pending: &PendingAction) -> Result<Self, ApiError> {
    match pending.action.as_str() {
      Self::COMPLETE_TASK => Ok(Action::CompleteTask {
        task_id: payload_id(pending, "task_id")?,
      }),
      Self::START_ASSIGNMENT => Ok(Action::StartAssignment {
        assignment_id: payload_id(pending, "assignment_id")?,
      }),
      other => Err(ApiError::InvalidAction(format!(
        "unknown action type {:?} (id {})",
        other, pending.id
      ))),
    }
  }
}

fn payload_id(pending: &PendingAction, field: &str) -> Result<String, ApiError> {
  pending
    .payload
    .get(field)
    .and_then(id_to_string)
    .ok_or_else(|| {
      ApiError::InvalidAction(format!(
        "{} (id {}) is missing {}",
        pending.action, pending.id, field
      ))
    })
}

/// Outcome of replaying one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrainResult {
  pub action: PendingAction,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// The pending-action queue.
///
/// `enqueue` and `drain` take a shared async lock around their
/// read-modify-write, so within one process an enqueue issued while a drain
/// is running waits for the drain to persist and is not lost. Executors
/// passed to `drain` must not call `enqueue` on the same queue.
pub struct PendingQueue<S: KvStorage> {
  cache: Cache<S>,
  lock: Arc<Mutex<()>>,
}

impl<S: KvStorage> PendingQueue<S> {
  pub fn new(cache: Cache<S>) -> Self {
    Self {
      cache,
      lock: Arc::new(Mutex::new(())),
    }
  }

  /// Current queue contents, oldest first.
  pub fn pending(&self) -> Vec<PendingAction> {
    self.cache.load(keys::PENDING_ACTIONS).unwrap_or_default()
  }

  pub fn len(&self) -> usize {
    self.pending().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Append a new action. Returns whether it was persisted.
  pub async fn enqueue(&self, action_type: &str, payload: Value) -> bool {
    let _guard = self.lock.lock().await;

    let mut actions = self.pending();
    let action = PendingAction::new(action_type, payload);
    info!(id = %action.id, action = action_type, "Pending action added for offline sync");
    actions.push(action);

    self.cache.save(keys::PENDING_ACTIONS, &actions)
  }

  pub async fn enqueue_action(&self, action: &Action) -> bool {
    self.enqueue(action.action_type(), action.payload()).await
  }

  /// Replay every queued action in order, keeping the ones that fail.
  ///
  /// Does nothing while offline. Each action is awaited before the next one
  /// starts. Returns one result per action that was attempted.
  pub async fn drain<C, F, Fut, E>(&self, connectivity: &C, mut executor: F) -> Vec<DrainResult>
  where
    C: Connectivity,
    F: FnMut(PendingAction) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: Display,
  {
    if !connectivity.is_online().await {
      info!("Cannot process pending actions: device is offline");
      return Vec::new();
    }

    let _guard = self.lock.lock().await;

    let actions = self.pending();
    info!(count = actions.len(), "Processing pending actions");

    let mut results = Vec::with_capacity(actions.len());
    let mut remaining = Vec::new();

    for action in actions {
      match executor(action.clone()).await {
        Ok(value) => results.push(DrainResult {
          action,
          success: true,
          result: Some(value),
          error: None,
        }),
        Err(e) => {
          warn!(id = %action.id, action = %action.action, error = %e, "Error processing action");
          results.push(DrainResult {
            action: action.clone(),
            success: false,
            result: None,
            error: Some(e.to_string()),
          });
          remaining.push(action);
        }
      }
    }

    if !self.cache.save(keys::PENDING_ACTIONS, &remaining) {
      warn!(
        remaining = remaining.len(),
        "Failed to persist pending actions after replay"
      );
    }

    results
  }
}

impl<S: KvStorage> Clone for PendingQueue<S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      lock: Arc::clone(&self.lock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::net::StaticConnectivity;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  fn new_queue() -> PendingQueue<MemoryStorage> {
    PendingQueue::new(Cache::new(MemoryStorage::new()))
  }

  fn actions_of(queue: &PendingQueue<MemoryStorage>) -> Vec<String> {
    queue.pending().into_iter().map(|a| a.action).collect()
  }

  #[test]
  fn test_pending_action_wire_shape() {
    let action = PendingAction::new("COMPLETE_TASK", json!({"task_id": "7"}));
    let value = serde_json::to_value(&action).unwrap();
    let obj = value.as_object().unwrap();

    let mut fields: Vec<&str> = obj.keys().map(String::as_str).collect();
    fields.sort();
    assert_eq!(fields, vec!["action", "id", "payload", "timestamp"]);
    assert!(action.id.parse::<i64>().is_ok());
    assert!(action.timestamp.ends_with('Z'));

    let parsed: PendingAction = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, action);
  }

  #[test]
  fn test_action_parsing() {
    let complete = PendingAction::new("COMPLETE_TASK", json!({"task_id": 12}));
    assert_eq!(
      Action::from_pending(&complete).unwrap(),
      Action::CompleteTask {
        task_id: "12".to_string()
      }
    );

    let start = PendingAction::new("START_ASSIGNMENT", json!({"assignment_id": "a9"}));
    let parsed = Action::from_pending(&start).unwrap();
    assert_eq!(parsed.action_type(), "START_ASSIGNMENT");
    assert_eq!(parsed.payload(), json!({"assignment_id": "a9"}));

    let malformed = PendingAction::new("COMPLETE_TASK", json!({"taskId": 12}));
    assert!(matches!(
      Action::from_pending(&malformed),
      Err(ApiError::InvalidAction(_))
    ));

    let unknown = PendingAction::new("DELETE_TASK", json!({}));
    assert!(Action::from_pending(&unknown).is_err());
  }

  #[tokio::test]
  async fn test_enqueue_then_drain_success_empties_queue() {
    let queue = new_queue();
    let online = StaticConnectivity::new(true);

    assert!(queue.enqueue("COMPLETE_TASK", json!({"task_id": "1"})).await);
    assert_eq!(queue.len(), 1);

    let results = queue
      .drain(&online, |_| async { Ok::<_, String>(json!({"success": true})) })
      .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].result, Some(json!({"success": true})));
    assert!(queue.is_empty());
  }

  #[tokio::test]
  async fn test_drain_failing_executor_keeps_everything_in_order() {
    let queue = new_queue();
    let online = StaticConnectivity::new(true);
    for name in ["A", "B", "C"] {
      queue.enqueue(name, json!({})).await;
    }

    let results = queue
      .drain(&online, |_| async { Err::<Value, _>("server down") })
      .await;

    let attempted: Vec<&str> = results.iter().map(|r| r.action.action.as_str()).collect();
    assert_eq!(attempted, vec!["A", "B", "C"]);
    assert!(results.iter().all(|r| !r.success));
    assert!(results
      .iter()
      .all(|r| r.error.as_deref() == Some("server down")));
    assert_eq!(actions_of(&queue), vec!["A", "B", "C"]);
  }

  #[tokio::test]
  async fn test_drain_offline_is_a_noop() {
    let queue = new_queue();
    let offline = StaticConnectivity::new(false);
    queue.enqueue("A", json!({})).await;

    let calls = AtomicUsize::new(0);
    let results = queue
      .drain(&offline, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, String>(Value::Null) }
      })
      .await;

    assert!(results.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(actions_of(&queue), vec!["A"]);
  }

  #[tokio::test]
  async fn test_partial_failure_keeps_only_failed_action() {
    let queue = new_queue();
    let online = StaticConnectivity::new(true);
    for name in ["A", "B", "C"] {
      queue.enqueue(name, json!({"name": name})).await;
    }

    let results = queue
      .drain(&online, |action| async move {
        if action.action == "B" {
          Err("rejected".to_string())
        } else {
          Ok(Value::Null)
        }
      })
      .await;

    let summary: Vec<(&str, bool)> = results
      .iter()
      .map(|r| (r.action.action.as_str(), r.success))
      .collect();
    assert_eq!(summary, vec![("A", true), ("B", false), ("C", true)]);
    assert_eq!(results[1].error.as_deref(), Some("rejected"));
    assert_eq!(actions_of(&queue), vec!["B"]);
    assert_eq!(queue.pending()[0].payload, json!({"name": "B"}));
  }

  #[tokio::test]
  async fn test_enqueue_during_drain_is_not_lost() {
    let queue = new_queue();
    queue.enqueue("A", json!({})).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let mut started_tx = Some(started_tx);

    let draining = queue.clone();
    let handle = tokio::spawn(async move {
      let online = StaticConnectivity::new(true);
      draining
        .drain(&online, move |_| {
          let started = started_tx.take();
          async move {
            if let Some(tx) = started {
              let _ = tx.send(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>(Value::Null)
          }
        })
        .await
    });

    started_rx.await.unwrap();
    assert!(queue.enqueue("B", json!({})).await);

    let results = handle.await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(actions_of(&queue), vec!["B"]);
  }
}
