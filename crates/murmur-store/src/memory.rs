use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::kv::{versioned_key, KeyValue};
use crate::models::VersionedObject;

/// Process-local [`KeyValue`] backend. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, VersionedObject>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str, version: u64) -> Result<VersionedObject> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries
            .get(&versioned_key(key, version))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn set(&self, key: &str, object: &VersionedObject) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(versioned_key(key, object.version), object.clone());
        Ok(())
    }

    fn delete(&self, key: &str, version: u64) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(&versioned_key(key, version));
        Ok(())
    }
}
