//! Fixed keys for the persisted local state.

/// Last fetched assignment list.
pub const ASSIGNMENTS: &str = "offline_assignments";

/// Map of assignment id to its last fetched task list.
pub const TASKS: &str = "offline_tasks";

/// Ordered list of pending actions awaiting replay.
pub const PENDING_ACTIONS: &str = "offline_pending_actions";

pub const TOKEN: &str = "token";
pub const USER: &str = "user";
