//! Typed cache over a key-value storage backend.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::types::{
  Assignment, Session, Task, User, STATUS_COMPLETED, STATUS_IN_PROGRESS,
};

use super::keys;
use super::traits::KvStorage;

/// JSON cache over a [`KvStorage`] backend.
///
/// Failures never propagate out of this type: writes report `false` and reads
/// report `None`, so callers treat "not found" and "failed to persist" alike.
pub struct Cache<S: KvStorage> {
  storage: Arc<S>,
}

impl<S: KvStorage> Cache<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Serialize `value` and store it under `key`, replacing any previous value.
  pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    let json = match serde_json::to_string(value) {
      Ok(json) => json,
      Err(e) => {
        warn!(key, error = %e, "Failed to serialize cache value");
        return false;
      }
    };

    match self.storage.set(key, &json) {
      Ok(()) => {
        debug!(key, "Data saved to cache");
        true
      }
      Err(e) => {
        warn!(key, error = %e, "Error saving to cache");
        false
      }
    }
  }

  /// Load the value under `key`. Missing and corrupt entries both yield `None`.
  pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.storage.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "Error retrieving from cache");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "Discarding unreadable cache entry");
        None
      }
    }
  }

  /// Delete `key`.
  pub fn remove(&self, key: &str) -> bool {
    match self.storage.remove(key) {
      Ok(()) => true,
      Err(e) => {
        warn!(key, error = %e, "Error removing from cache");
        false
      }
    }
  }

  pub fn cache_assignments(&self, assignments: &[Assignment]) -> bool {
    self.save(keys::ASSIGNMENTS, assignments)
  }

  pub fn cached_assignments(&self) -> Option<Vec<Assignment>> {
    self.load(keys::ASSIGNMENTS)
  }

  /// Store the task list of one assignment, keeping the others.
  pub fn cache_tasks(&self, assignment_id: &str, tasks: &[Task]) -> bool {
    let mut by_assignment: HashMap<String, Vec<Task>> = self.load(keys::TASKS).unwrap_or_default();
    by_assignment.insert(assignment_id.to_string(), tasks.to_vec());
    self.save(keys::TASKS, &by_assignment)
  }

  /// Cached tasks for an assignment, empty when none were cached.
  pub fn cached_tasks(&self, assignment_id: &str) -> Vec<Task> {
    let mut by_assignment: HashMap<String, Vec<Task>> = self.load(keys::TASKS).unwrap_or_default();
    by_assignment.remove(assignment_id).unwrap_or_default()
  }

  /// Mark a cached task completed, wherever it is cached.
  pub fn mark_task_completed(&self, task_id: &str) -> bool {
    let Some(mut by_assignment) = self.load::<HashMap<String, Vec<Task>>>(keys::TASKS) else {
      return false;
    };

    let mut found = false;
    for task in by_assignment.values_mut().flatten() {
      if task.id == task_id {
        task.status = STATUS_COMPLETED.to_string();
        found = true;
      }
    }

    found && self.save(keys::TASKS, &by_assignment)
  }

  /// Mark a cached assignment as in progress.
  pub fn mark_assignment_started(&self, assignment_id: &str) -> bool {
    let Some(mut assignments) = self.cached_assignments() else {
      return false;
    };

    let Some(assignment) = assignments.iter_mut().find(|a| a.id == assignment_id) else {
      return false;
    };
    assignment.status = STATUS_IN_PROGRESS.to_string();

    self.cache_assignments(&assignments)
  }

  pub fn save_session(&self, session: &Session) -> bool {
    // Token is stored as a JSON string so every key holds JSON text
    self.save(keys::TOKEN, &session.token) && self.save(keys::USER, &session.user)
  }

  /// Read the session fresh from storage. Both keys must be present.
  pub fn load_session(&self) -> Option<Session> {
    let token: String = self.load(keys::TOKEN)?;
    let user: User = self.load(keys::USER)?;
    if token.is_empty() {
      return None;
    }
    Some(Session { token, user })
  }

  pub fn clear_session(&self) -> bool {
    let token_removed = self.remove(keys::TOKEN);
    let user_removed = self.remove(keys::USER);
    token_removed && user_removed
  }
}

impl<S: KvStorage> Clone for Cache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use color_eyre::{eyre::eyre, Result};
  use serde_json::{json, Value};

  /// Storage whose writes always fail, like a full disk.
  struct BrokenStorage;

  impl KvStorage for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Err(eyre!("disk unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("disk full"))
    }

    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("permission denied"))
    }
  }

  fn task(id: &str) -> Task {
    serde_json::from_value(json!({"id": id, "name": format!("task {}", id), "status": "Pending"}))
      .unwrap()
  }

  #[test]
  fn test_save_then_load_round_trips() {
    let cache = Cache::new(MemoryStorage::new());
    let values = vec![
      json!(null),
      json!(42),
      json!("text"),
      json!([1, "two", {"three": 3.5}]),
      json!({"nested": {"list": [true, false], "empty": {}}}),
    ];

    for (i, value) in values.into_iter().enumerate() {
      let key = format!("k{}", i);
      assert!(cache.save(&key, &value));
      let loaded: Option<Value> = cache.load(&key);
      assert_eq!(loaded, Some(value));
    }
  }

  #[test]
  fn test_save_overwrites() {
    let cache = Cache::new(MemoryStorage::new());
    cache.save("k", &1);
    cache.save("k", &2);
    assert_eq!(cache.load::<i32>("k"), Some(2));
  }

  #[test]
  fn test_load_missing_is_none() {
    let cache = Cache::new(MemoryStorage::new());
    assert_eq!(cache.load::<Value>("never-set"), None);
  }

  #[test]
  fn test_corrupt_entry_is_none() {
    let storage = MemoryStorage::new();
    storage.set("k", "{not json").unwrap();
    let cache = Cache::new(storage);
    assert_eq!(cache.load::<Value>("k"), None);
  }

  #[test]
  fn test_storage_failures_are_swallowed() {
    let cache = Cache::new(BrokenStorage);
    assert!(!cache.save("k", &json!({"a": 1})));
    assert_eq!(cache.load::<Value>("k"), None);
    assert!(!cache.remove("k"));
  }

  #[test]
  fn test_cache_tasks_keeps_other_assignments() {
    let cache = Cache::new(MemoryStorage::new());
    assert!(cache.cache_tasks("a1", &[task("1"), task("2")]));
    assert!(cache.cache_tasks("a2", &[task("3")]));
    assert!(cache.cache_tasks("a1", &[task("4")]));

    let a1: Vec<String> = cache.cached_tasks("a1").into_iter().map(|t| t.id).collect();
    let a2: Vec<String> = cache.cached_tasks("a2").into_iter().map(|t| t.id).collect();
    assert_eq!(a1, vec!["4"]);
    assert_eq!(a2, vec!["3"]);
    assert!(cache.cached_tasks("missing").is_empty());
  }

  #[test]
  fn test_mark_task_completed() {
    let cache = Cache::new(MemoryStorage::new());
    assert!(!cache.mark_task_completed("1"));

    cache.cache_tasks("a1", &[task("1"), task("2")]);
    assert!(cache.mark_task_completed("2"));
    assert!(!cache.mark_task_completed("99"));

    let statuses: Vec<(String, bool)> = cache
      .cached_tasks("a1")
      .into_iter()
      .map(|t| (t.id.clone(), t.is_completed()))
      .collect();
    assert_eq!(
      statuses,
      vec![("1".to_string(), false), ("2".to_string(), true)]
    );
  }

  #[test]
  fn test_mark_assignment_started() {
    let cache = Cache::new(MemoryStorage::new());
    let assignments: Vec<Assignment> = serde_json::from_value(json!([
      {"id": "a1", "category": "HVAC", "status": "Queued"},
      {"id": "a2", "category": "Electrical", "status": "Queued"}
    ]))
    .unwrap();
    cache.cache_assignments(&assignments);

    assert!(cache.mark_assignment_started("a2"));
    let cached = cache.cached_assignments().unwrap();
    assert!(!cached[0].is_in_progress());
    assert!(cached[1].is_in_progress());
  }

  #[test]
  fn test_session_lifecycle() {
    let cache = Cache::new(MemoryStorage::new());
    assert!(cache.load_session().is_none());

    let user: User =
      serde_json::from_value(json!({"role": "Technician", "team_id": "t1"})).unwrap();
    let session = Session {
      token: "secret".to_string(),
      user,
    };
    assert!(cache.save_session(&session));
    assert_eq!(cache.load_session(), Some(session));

    assert!(cache.clear_session());
    assert!(cache.load_session().is_none());
    assert_eq!(cache.load::<Value>(keys::TOKEN), None);
    assert_eq!(cache.load::<Value>(keys::USER), None);
  }

  #[test]
  fn test_session_requires_both_keys() {
    let cache = Cache::new(MemoryStorage::new());
    cache.save(keys::TOKEN, "only-token");
    assert!(cache.load_session().is_none());
  }
}
