//! Shared storage abstraction for the session sync engine.
//!
//! The engine keeps three JSON documents in a key-value store that every
//! execution context of the same origin can see:
//! - **auth state**: the versioned `StoredAuthState` envelope
//! - **session persistence**: the full session persistence state
//! - **health metrics**: counters that survive reloads
//!
//! Backends:
//! - [`MemoryStore`]: process-local map, cloneable handles share one map
//! - [`FileStore`]: one JSON file per key in a directory

mod file;
mod json;
mod keys;
mod memory;
mod traits;

pub use file::FileStore;
pub use json::{load_json, save_json};
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::{KeyValueStore, SharedStore};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The backend refused the write because it is full
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Key cannot be represented by this backend
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_) | StorageError::Io(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
