//! Push-notification filter derived from partner notification levels.
//!
//! Every partner at [`NotificationLevel::NotifyAll`] contributes one SIH tag
//! to the filter. Whenever the partner store changes the filter is rebuilt
//! and handed to the registered [`NotificationUpdate`] together with the
//! changed and deleted partners.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use murmur_shared::identity::partner_reception_id;
use murmur_shared::sih::{
    evaluate_compressed_sih, make_compressed_sih, make_sih_tag, COMPRESSED_SIH_LEN,
};
use murmur_shared::types::{MessageType, PublicKey, ReceptionId};
use murmur_shared::Identity;

use crate::error::DmError;
use crate::partners::{EditOperation, Partner, PartnerEdit, PartnerStatus, PartnerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationLevel {
    NotifyNone = 10,
    NotifyAll = 40,
}

impl From<PartnerStatus> for NotificationLevel {
    fn from(status: PartnerStatus) -> Self {
        match status {
            PartnerStatus::NotifyAll => Self::NotifyAll,
            PartnerStatus::Mute | PartnerStatus::Blocked => Self::NotifyNone,
        }
    }
}

impl NotificationLevel {
    fn partner_status(self) -> PartnerStatus {
        match self {
            Self::NotifyNone => PartnerStatus::Mute,
            Self::NotifyAll => PartnerStatus::NotifyAll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationState {
    pub partner: PublicKey,
    pub level: NotificationLevel,
}

/// What a notification service needs to pick out this client's pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    /// This client's public key
    pub identifier: Vec<u8>,
    pub my_id: ReceptionId,
    /// One SIH tag per partner at `NotifyAll`, sorted
    pub tags: Vec<String>,
    pub public_keys: HashMap<String, PublicKey>,
    pub allowed_types: HashSet<MessageType>,
}

pub type NotificationUpdate =
    Arc<dyn Fn(NotificationFilter, Vec<NotificationState>, Vec<PublicKey>) + Send + Sync>;

/// A push as delivered by the notification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub message_hash: Vec<u8>,
    pub identity_fp: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationReport {
    pub partner: PublicKey,
    pub message_type: MessageType,
}

fn notify_all_types() -> HashSet<MessageType> {
    [MessageType::Text, MessageType::Reply].into_iter().collect()
}

pub struct Notifications {
    me: Arc<Identity>,
    partners: Arc<PartnerStore>,
    tags: Mutex<HashMap<PublicKey, String>>,
    callback: Option<NotificationUpdate>,
}

impl Notifications {
    /// Create the filter manager and subscribe it to `partners`. The
    /// callback fires right away if partners already exist.
    pub fn new(
        me: Arc<Identity>,
        partners: Arc<PartnerStore>,
        callback: Option<NotificationUpdate>,
    ) -> Arc<Self> {
        let notifications = Arc::new(Self {
            me,
            partners: partners.clone(),
            tags: Mutex::new(HashMap::new()),
            callback,
        });

        let weak = Arc::downgrade(&notifications);
        partners.listen(Arc::new(move |edits: &[PartnerEdit]| {
            if let Some(n) = weak.upgrade() {
                n.on_partner_edits(edits);
            }
        }));
        notifications
    }

    pub fn get_notification_level(&self, partner: &PublicKey) -> Result<NotificationLevel, DmError> {
        self.partners
            .get(partner)
            .map(|p| p.status.into())
            .ok_or(DmError::PartnerNotFound(*partner))
    }

    pub fn set_notification_level(
        &self,
        partner: &PublicKey,
        level: NotificationLevel,
    ) -> Result<(), DmError> {
        self.partners.set(partner, level.partner_status())
    }

    /// The current filter.
    pub fn filter(&self) -> NotificationFilter {
        let tags = self.tags.lock().unwrap_or_else(|p| p.into_inner());
        self.build_filter(&tags)
    }

    fn on_partner_edits(&self, edits: &[PartnerEdit]) {
        let mut changed = Vec::new();
        let mut deleted = Vec::new();

        let filter = {
            let mut tags = self.tags.lock().unwrap_or_else(|p| p.into_inner());
            for edit in edits {
                let key = edit.new.public_key;
                let notify_all = edit.new.status == PartnerStatus::NotifyAll;
                match edit.operation {
                    EditOperation::Created | EditOperation::Loaded => {
                        if notify_all {
                            self.add_tag(&mut tags, &key);
                        }
                        changed.push(state_of(&edit.new));
                    }
                    EditOperation::Updated => {
                        let was_all = edit
                            .old
                            .is_some_and(|old| old.status == PartnerStatus::NotifyAll);
                        if notify_all && !was_all {
                            self.add_tag(&mut tags, &key);
                        } else if was_all && !notify_all {
                            tags.remove(&key);
                        }
                        changed.push(state_of(&edit.new));
                    }
                    EditOperation::Deleted => {
                        tags.remove(&key);
                        deleted.push(key);
                    }
                }
            }
            self.build_filter(&tags)
        };

        debug!(
            tags = filter.tags.len(),
            changed = changed.len(),
            deleted = deleted.len(),
            "notification filter rebuilt"
        );
        if let Some(callback) = &self.callback {
            callback(filter, changed, deleted);
        }
    }

    fn add_tag(&self, tags: &mut HashMap<PublicKey, String>, partner: &PublicKey) {
        match make_sih_tag(&self.me, partner) {
            Ok(tag) => {
                tags.insert(*partner, tag);
            }
            Err(e) => warn!(partner = %partner.short(), error = %e, "cannot derive notification tag"),
        }
    }

    fn build_filter(&self, tags: &HashMap<PublicKey, String>) -> NotificationFilter {
        let mut sorted: Vec<String> = tags.values().cloned().collect();
        sorted.sort();
        NotificationFilter {
            identifier: self.me.public_key().as_bytes().to_vec(),
            my_id: self.me.reception_id(),
            tags: sorted,
            public_keys: tags.iter().map(|(k, t)| (t.clone(), *k)).collect(),
            allowed_types: notify_all_types(),
        }
    }
}

fn state_of(partner: &Partner) -> NotificationState {
    NotificationState {
        partner: partner.public_key,
        level: partner.status.into(),
    }
}

/// Pushes in `records` that `filter` accepts, one report per matching partner.
pub fn notification_reports_for_me(
    filter: &NotificationFilter,
    records: &[NotificationRecord],
) -> Vec<NotificationReport> {
    let mut reports = Vec::new();
    for record in records {
        let Some(found) = evaluate_compressed_sih(
            &filter.identifier,
            &filter.my_id,
            &record.message_hash,
            &filter.tags,
            &record.identity_fp,
        ) else {
            continue;
        };

        let message_type = MessageType::from_notification_bytes(found.metadata);
        if !filter.allowed_types.contains(&message_type) {
            continue;
        }
        for tag in &found.tags {
            if let Some(partner) = filter.public_keys.get(tag) {
                reports.push(NotificationReport {
                    partner: *partner,
                    message_type,
                });
            }
        }
    }
    reports
}

/// Fingerprint a push about a message from `sender` to `recipient`.
pub fn make_notification_fp(
    sender: &Identity,
    recipient: &PublicKey,
    recipient_token: u32,
    message_hash: &[u8],
    message_type: MessageType,
) -> Result<[u8; COMPRESSED_SIH_LEN], DmError> {
    let tag = make_sih_tag(sender, recipient)?;
    let reception_id = partner_reception_id(recipient, recipient_token)?;
    Ok(make_compressed_sih(
        recipient.as_bytes(),
        &reception_id,
        message_hash,
        &tag,
        message_type.to_notification_bytes(),
    ))
}
