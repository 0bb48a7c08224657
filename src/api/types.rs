//! Domain types for the assignment service.
//!
//! Unknown fields are kept in `extra` so that data written to the local cache
//! round-trips without loss.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_COMPLETED: &str = "Completed";

/// The only role allowed to use this client.
pub const TECHNICIAN_ROLE: &str = "Technician";

/// Signed-in user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  #[serde(
    default,
    deserialize_with = "deserialize_opt_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default)]
  pub role: String,
  #[serde(
    default,
    deserialize_with = "deserialize_opt_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub team_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl User {
  pub fn is_technician(&self) -> bool {
    self.role == TECHNICIAN_ROLE
  }

  /// Name to show in status lines.
  pub fn display_name(&self) -> &str {
    self
      .name
      .as_deref()
      .or(self.email.as_deref())
      .unwrap_or("unknown user")
  }
}

/// Token plus profile, as stored after a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
  pub token: String,
  pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
  pub token: String,
  pub user: User,
}

/// A unit of field work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(default)]
  pub category: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subcategory: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority_level: Option<String>,
  #[serde(default)]
  pub status: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Assignment {
  pub fn is_in_progress(&self) -> bool {
    self.status == STATUS_IN_PROGRESS
  }

  pub fn is_completed(&self) -> bool {
    self.status == STATUS_COMPLETED
  }

  pub fn subcategory_or_default(&self) -> &str {
    self
      .subcategory
      .as_deref()
      .filter(|s| !s.is_empty())
      .unwrap_or("General")
  }

  /// L1 is the most urgent. Unknown levels sort last.
  pub fn priority_rank(&self) -> u8 {
    match self.priority_level.as_deref() {
      Some("L1") => 1,
      Some("L2") => 2,
      Some("L3") => 3,
      Some("L4") => 4,
      _ => u8::MAX,
    }
  }
}

/// Assignments still to be worked: in-progress first, then by priority.
pub fn queue_view(assignments: &[Assignment]) -> Vec<&Assignment> {
  let mut open: Vec<&Assignment> = assignments.iter().filter(|a| !a.is_completed()).collect();
  open.sort_by_key(|a| (!a.is_in_progress(), a.priority_rank()));
  open
}

/// The assignment currently being worked, if any.
pub fn current_assignment(assignments: &[Assignment]) -> Option<&Assignment> {
  assignments.iter().find(|a| a.is_in_progress())
}

/// A single actionable item within an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(
    default,
    deserialize_with = "deserialize_opt_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub assignment_id: Option<String>,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub photo_url: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Task {
  pub fn is_completed(&self) -> bool {
    self.status == STATUS_COMPLETED
  }
}

/// Response to marking a task complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteTaskResponse {
  #[serde(default)]
  pub success: Option<bool>,
  /// Set when this task was the last open one in its assignment.
  #[serde(default)]
  pub assignment_completed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignment_id: Option<Value>,
}

/// Render a JSON id (string or number) as a string.
pub fn id_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  id_to_string(&value)
    .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {}", value)))
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value: Option<Value> = Option::deserialize(deserializer)?;
  Ok(value.as_ref().and_then(id_to_string))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn assignment(id: &str, status: &str, priority: &str) -> Assignment {
    serde_json::from_value(json!({
      "id": id,
      "category": "HVAC",
      "status": status,
      "priority_level": priority,
    }))
    .unwrap()
  }

  #[test]
  fn test_numeric_ids_become_strings() {
    let task: Task = serde_json::from_value(json!({
      "id": 17,
      "assignment_id": 4,
      "name": "Replace filter",
      "status": "Pending"
    }))
    .unwrap();
    assert_eq!(task.id, "17");
    assert_eq!(task.assignment_id.as_deref(), Some("4"));
    assert!(!task.is_completed());
  }

  #[test]
  fn test_unknown_fields_are_preserved() {
    let raw = json!({
      "id": "a1",
      "category": "Plumbing",
      "status": "Queued",
      "location": {"building": "B"}
    });
    let parsed: Assignment = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(parsed.extra.get("location"), Some(&json!({"building": "B"})));
    assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
  }

  #[test]
  fn test_queue_order() {
    let assignments = vec![
      assignment("1", "Queued", "L3"),
      assignment("2", "Queued", "L1"),
      assignment("3", "In Progress", "L4"),
      assignment("4", "Queued", "P9"),
    ];
    let ids: Vec<&str> = queue_view(&assignments).iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2", "1", "4"]);
  }

  #[test]
  fn test_queue_view_hides_completed() {
    let assignments = vec![
      assignment("1", "Completed", "L1"),
      assignment("2", "Queued", "L2"),
      assignment("3", "In Progress", "L3"),
    ];
    let ids: Vec<&str> = queue_view(&assignments).iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2"]);
    assert_eq!(current_assignment(&assignments).map(|a| a.id.as_str()), Some("3"));
  }

  #[test]
  fn test_user_role_check() {
    let user: User = serde_json::from_value(json!({
      "id": 9,
      "email": "tech@example.com",
      "role": "Technician",
      "team_id": 3
    }))
    .unwrap();
    assert!(user.is_technician());
    assert_eq!(user.team_id.as_deref(), Some("3"));
    assert_eq!(user.display_name(), "tech@example.com");
  }

  #[test]
  fn test_complete_response_defaults() {
    let resp: CompleteTaskResponse = serde_json::from_value(json!({"success": true})).unwrap();
    assert!(!resp.assignment_completed);
    assert_eq!(resp.success, Some(true));
  }
}
