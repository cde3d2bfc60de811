//! Typed JSON access on top of a [`KeyValueStore`].

use crate::{KeyValueStore, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Read and deserialize a JSON document.
///
/// A missing key and an unparseable document both yield `Ok(None)`; the latter
/// is logged. Backend failures are returned as errors.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(key = %key, error = %err, "Ignoring unparseable stored document");
            Ok(None)
        }
    }
}

/// Serialize a value as JSON and store it under `key`.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> StorageResult<()> {
    let raw = serde_json::to_string(value).map_err(|err| StorageError::Encoding(err.to_string()))?;
    store.set(key, &raw)
}
