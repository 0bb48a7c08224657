//! Core trait for the key-value storage backends.

use color_eyre::Result;

/// A durable string-to-string store.
///
/// Values are JSON text; encoding and decoding happen in [`super::Cache`],
/// so backends never see typed data.
pub trait KvStorage: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete `key`. Deleting a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}
