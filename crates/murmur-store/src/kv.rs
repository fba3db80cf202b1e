use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::models::VersionedObject;

/// String-keyed storage of whole-value versioned records.
///
/// A key written at one version is invisible to reads at another, so a
/// schema bump never decodes stale data.
pub trait KeyValue: Send + Sync {
    /// Fetch the record stored under `key` at `version`, or
    /// [`StoreError::NotFound`].
    fn get(&self, key: &str, version: u64) -> Result<VersionedObject>;

    /// Replace the record under `key` at `object.version`.
    fn set(&self, key: &str, object: &VersionedObject) -> Result<()>;

    fn delete(&self, key: &str, version: u64) -> Result<()>;

    fn exists(&self, key: &str, version: u64) -> Result<bool> {
        match self.get(key, version) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Storage key a record lives under once its version is folded in.
pub(crate) fn versioned_key(key: &str, version: u64) -> String {
    format!("{key}_v{version}")
}

/// Decode the JSON record at `key`, `None` when nothing is stored.
pub fn load_json<T: DeserializeOwned>(
    kv: &dyn KeyValue,
    key: &str,
    version: u64,
) -> Result<Option<T>> {
    match kv.get(key, version) {
        Ok(obj) => Ok(Some(serde_json::from_slice(&obj.data)?)),
        Err(StoreError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encode `value` as JSON and store it as a whole-value replace.
pub fn save_json<T: Serialize + ?Sized>(
    kv: &dyn KeyValue,
    key: &str,
    version: u64,
    value: &T,
) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    kv.set(key, &VersionedObject::new(version, data))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::memory::MemoryKv;

    #[test]
    fn json_helpers_round_trip() {
        let kv = MemoryKv::new();
        let mut value = HashMap::new();
        value.insert("alpha".to_string(), 1u32);

        assert_eq!(load_json::<HashMap<String, u32>>(&kv, "k", 0).unwrap(), None);
        save_json(&kv, "k", 0, &value).unwrap();
        assert_eq!(load_json::<HashMap<String, u32>>(&kv, "k", 0).unwrap(), Some(value));
    }

    #[test]
    fn versions_are_isolated() {
        let kv = MemoryKv::new();
        save_json(&kv, "k", 0, &7u32).unwrap();
        assert!(kv.exists("k", 0).unwrap());
        assert!(!kv.exists("k", 1).unwrap());
    }
}
