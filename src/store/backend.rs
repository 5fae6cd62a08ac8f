//! Store Backend Interface
//!
//! The generic key-value surface every persistence concern is built on:
//! plain reads and writes, the conditional writes the session layer needs
//! for collision-free creation and version-checked saves, and ordered
//! prefix scans for listing. The store is external and shared by all
//! server processes; implementations wrap whatever actually holds the
//! data.

use async_trait::async_trait;

/// Errors surfaced by a store backend or the typed layers above it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key (or the entity behind it) is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write observed different data than expected.
    #[error("version conflict on {0}")]
    VersionConflict(String),

    /// Persisted payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend itself failed; the operation may be retried.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for failures worth retrying against the same backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Generic async key-value store shared across server processes.
///
/// Implementations must make `put_if_absent` and `compare_and_swap`
/// atomic: the check and the write happen under one consistent view of
/// the key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` at `key`, overwriting any existing value.
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Write only when `key` is absent. Returns false when the key exists.
    async fn put_if_absent(&self, key: &str, value: String) -> Result<bool, StoreError>;

    /// Replace the value at `key` only if it currently equals `expected`.
    ///
    /// Returns false without writing on a mismatch or a missing key.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: String,
    ) -> Result<bool, StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Keys beginning with `prefix`, in lexicographic order.
    ///
    /// Never enumerates the whole key space.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
