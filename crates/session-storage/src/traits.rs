//! Storage trait definitions.

use crate::StorageResult;
use std::sync::Arc;

/// A string key-value store shared by every execution context.
///
/// Writes are last-write-wins; there is no locking across contexts.
pub trait KeyValueStore: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Shared store handle injected into services.
pub type SharedStore = Arc<dyn KeyValueStore>;
