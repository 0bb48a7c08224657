//! Local persistence for offline use.
//!
//! This module provides a small JSON key-value cache that:
//! - Stores arbitrary serializable values under string keys
//! - Survives restarts (SQLite backend) or lives in memory for tests
//! - Swallows storage failures, reporting them as `false` / `None`
//! - Owns the session (token + user) and the cached assignment data

pub mod keys;
mod layer;
mod storage;
mod traits;

pub use layer::Cache;
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::KvStorage;
