//! Persistent per-partner conversation settings.
//!
//! Every partner that has sent or received a DM gets an entry holding its
//! notification/blocking status. Listeners are told about every change in
//! batches of [`PartnerEdit`]s, and an optional backup trigger fires after
//! each mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use murmur_shared::types::PublicKey;
use murmur_store::{load_json, save_json, KeyValue};

use crate::error::DmError;

const PARTNER_STORE_KEY: &str = "dm_partners";
const PARTNER_STORE_VERSION: u64 = 0;

/// Conversation status of a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum PartnerStatus {
    Mute,
    NotifyAll,
    Blocked,
}

impl PartnerStatus {
    pub const DEFAULT: PartnerStatus = PartnerStatus::NotifyAll;
}

impl From<PartnerStatus> for u32 {
    fn from(status: PartnerStatus) -> u32 {
        match status {
            PartnerStatus::Mute => 10,
            PartnerStatus::NotifyAll => 20,
            PartnerStatus::Blocked => 50,
        }
    }
}

impl TryFrom<u32> for PartnerStatus {
    type Error = String;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            10 => Ok(Self::Mute),
            20 => Ok(Self::NotifyAll),
            50 => Ok(Self::Blocked),
            other => Err(format!("invalid partner status {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partner {
    pub public_key: PublicKey,
    pub status: PartnerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    Created,
    /// Reported once per existing entry when a listener registers
    Loaded,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerEdit {
    pub old: Option<Partner>,
    /// The entry after the edit. For deletions, the removed entry
    pub new: Partner,
    pub operation: EditOperation,
}

pub type PartnerListener = Arc<dyn Fn(&[PartnerEdit]) + Send + Sync>;

/// Invoked with the storage key after every persisted change.
pub type BackupTrigger = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Serialize, Deserialize)]
struct StoredPartner {
    #[serde(rename = "s")]
    status: PartnerStatus,
}

pub struct PartnerStore {
    kv: Arc<dyn KeyValue>,
    partners: RwLock<HashMap<PublicKey, PartnerStatus>>,
    listeners: Mutex<Vec<PartnerListener>>,
    backup: Option<BackupTrigger>,
}

impl PartnerStore {
    /// Load the partner map from `kv`.
    pub fn new(kv: Arc<dyn KeyValue>, backup: Option<BackupTrigger>) -> Result<Self, DmError> {
        let stored: HashMap<String, StoredPartner> =
            load_json(kv.as_ref(), PARTNER_STORE_KEY, PARTNER_STORE_VERSION)?.unwrap_or_default();

        let mut partners = HashMap::with_capacity(stored.len());
        for (name, entry) in stored {
            match PublicKey::from_element_name(&name) {
                Some(key) => {
                    partners.insert(key, entry.status);
                }
                None => error!(element = %name, "skipping partner with unparsable element name"),
            }
        }
        debug!(count = partners.len(), "loaded DM partners");

        Ok(Self {
            kv,
            partners: RwLock::new(partners),
            listeners: Mutex::new(Vec::new()),
            backup,
        })
    }

    pub fn get(&self, key: &PublicKey) -> Option<Partner> {
        let partners = self.partners.read().unwrap_or_else(|p| p.into_inner());
        partners.get(key).map(|status| Partner {
            public_key: *key,
            status: *status,
        })
    }

    /// Fetch `key`, creating it with the default status when absent.
    pub fn get_or_set(&self, key: &PublicKey) -> Result<Partner, DmError> {
        let created = {
            let mut partners = self.partners.write().map_err(|_| DmError::LockPoisoned)?;
            if let Some(status) = partners.get(key) {
                return Ok(Partner {
                    public_key: *key,
                    status: *status,
                });
            }
            partners.insert(*key, PartnerStatus::DEFAULT);
            self.persist(&partners)?;
            Partner {
                public_key: *key,
                status: PartnerStatus::DEFAULT,
            }
        };

        self.notify(&[PartnerEdit {
            old: None,
            new: created,
            operation: EditOperation::Created,
        }]);
        Ok(created)
    }

    pub fn set(&self, key: &PublicKey, status: PartnerStatus) -> Result<(), DmError> {
        let edit = {
            let mut partners = self.partners.write().map_err(|_| DmError::LockPoisoned)?;
            let old = partners.insert(*key, status);
            self.persist(&partners)?;
            PartnerEdit {
                old: old.map(|s| Partner {
                    public_key: *key,
                    status: s,
                }),
                new: Partner {
                    public_key: *key,
                    status,
                },
                operation: if old.is_some() {
                    EditOperation::Updated
                } else {
                    EditOperation::Created
                },
            }
        };

        info!(partner = %key.short(), ?status, "partner status set");
        self.notify(&[edit]);
        Ok(())
    }

    pub fn delete(&self, key: &PublicKey) -> Result<(), DmError> {
        let removed = {
            let mut partners = self.partners.write().map_err(|_| DmError::LockPoisoned)?;
            let removed = partners.remove(key);
            if removed.is_some() {
                self.persist(&partners)?;
            }
            removed
        };

        if let Some(status) = removed {
            let gone = Partner {
                public_key: *key,
                status,
            };
            self.notify(&[PartnerEdit {
                old: Some(gone),
                new: gone,
                operation: EditOperation::Deleted,
            }]);
        }
        Ok(())
    }

    pub fn all(&self) -> Vec<Partner> {
        let partners = self.partners.read().unwrap_or_else(|p| p.into_inner());
        partners
            .iter()
            .map(|(key, status)| Partner {
                public_key: *key,
                status: *status,
            })
            .collect()
    }

    /// Register `listener`. It is called right away with a `Loaded` edit for
    /// every existing partner, then with every later change.
    pub fn listen(&self, listener: PartnerListener) {
        let loaded: Vec<PartnerEdit> = self
            .all()
            .into_iter()
            .map(|p| PartnerEdit {
                old: None,
                new: p,
                operation: EditOperation::Loaded,
            })
            .collect();

        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener.clone());
        }
        if !loaded.is_empty() {
            listener(&loaded);
        }
    }

    fn persist(&self, partners: &HashMap<PublicKey, PartnerStatus>) -> Result<(), DmError> {
        let stored: HashMap<String, StoredPartner> = partners
            .iter()
            .map(|(key, status)| (key.to_element_name(), StoredPartner { status: *status }))
            .collect();
        save_json(self.kv.as_ref(), PARTNER_STORE_KEY, PARTNER_STORE_VERSION, &stored)?;
        Ok(())
    }

    fn notify(&self, edits: &[PartnerEdit]) {
        if let Some(backup) = &self.backup {
            backup(PARTNER_STORE_KEY);
        }
        let listeners: Vec<PartnerListener> = match self.listeners.lock() {
            Ok(l) => l.clone(),
            Err(p) => p.into_inner().clone(),
        };
        for listener in listeners {
            listener(edits);
        }
    }
}
