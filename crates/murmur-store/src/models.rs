use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored value together with its schema version and write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedObject {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl VersionedObject {
    /// Wrap `data` stamped with the current time.
    pub fn new(version: u64, data: Vec<u8>) -> Self {
        Self {
            version,
            timestamp: Utc::now(),
            data,
        }
    }
}
