use std::sync::{Arc, RwLock};

use tracing::debug;

use murmur_shared::types::ReceptionId;
use murmur_store::{load_json, save_json, KeyValue};

use crate::error::DmError;

const NICKNAME_VERSION: u64 = 0;
pub const MIN_NICKNAME_LEN: usize = 3;
pub const MAX_NICKNAME_LEN: usize = 24;

/// Check a nickname and return its trimmed form.
pub fn validate_nickname(nick: &str) -> Result<String, DmError> {
    let trimmed = nick.trim();
    let len = trimmed.chars().count();
    if len < MIN_NICKNAME_LEN {
        return Err(DmError::InvalidNickname(format!(
            "must be at least {MIN_NICKNAME_LEN} characters"
        )));
    }
    if len > MAX_NICKNAME_LEN {
        return Err(DmError::InvalidNickname(format!(
            "must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DmError::InvalidNickname("contains control characters".into()));
    }
    Ok(trimmed.to_string())
}

/// The nickname stamped on outgoing messages, persisted per identity.
pub struct NicknameManager {
    kv: Arc<dyn KeyValue>,
    store_key: String,
    nick: RwLock<Option<String>>,
}

impl NicknameManager {
    pub fn new(owner: &ReceptionId, kv: Arc<dyn KeyValue>) -> Result<Self, DmError> {
        let store_key = format!("dm_nickname_{owner}");
        let nick: Option<String> = load_json(kv.as_ref(), &store_key, NICKNAME_VERSION)?;
        debug!(has_nickname = nick.is_some(), "loaded DM nickname");
        Ok(Self {
            kv,
            store_key,
            nick: RwLock::new(nick),
        })
    }

    pub fn get_nickname(&self) -> Option<String> {
        self.nick.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn set_nickname(&self, nick: &str) -> Result<(), DmError> {
        let nick = validate_nickname(nick)?;
        let mut current = self.nick.write().map_err(|_| DmError::LockPoisoned)?;
        save_json(self.kv.as_ref(), &self.store_key, NICKNAME_VERSION, &nick)?;
        *current = Some(nick);
        Ok(())
    }
}
