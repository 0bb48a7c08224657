//! Assignment service API.
//! Provides the HTTP client, the offline-aware wrapper, and domain types.

pub mod cached_client;
pub mod client;
pub mod types;
