//! An [`EventModel`] that writes every DM event to the log.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use murmur_dm::{EventModel, MessageInfo, StatusUpdate};
use murmur_shared::types::{MessageId, PublicKey};

pub struct LoggingModel {
    name: String,
    next_uuid: AtomicU64,
}

impl LoggingModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next_uuid: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u64 {
        self.next_uuid.fetch_add(1, Ordering::Relaxed)
    }
}

impl EventModel for LoggingModel {
    fn receive(&self, info: &MessageInfo, payload: &[u8]) -> u64 {
        info!(
            node = %self.name,
            msg_id = %info.message_id,
            kind = %info.message_type,
            len = payload.len(),
            status = ?info.status,
            "message"
        );
        self.next()
    }

    fn receive_text(&self, info: &MessageInfo, text: &str) -> u64 {
        info!(
            node = %self.name,
            msg_id = %info.message_id,
            from = %info.nickname,
            status = ?info.status,
            "text: {text}"
        );
        self.next()
    }

    fn receive_reply(&self, info: &MessageInfo, reply_to: &MessageId, text: &str) -> u64 {
        info!(
            node = %self.name,
            msg_id = %info.message_id,
            from = %info.nickname,
            %reply_to,
            status = ?info.status,
            "reply: {text}"
        );
        self.next()
    }

    fn receive_reaction(&self, info: &MessageInfo, react_to: &MessageId, reaction: &str) -> u64 {
        info!(
            node = %self.name,
            msg_id = %info.message_id,
            from = %info.nickname,
            %react_to,
            status = ?info.status,
            "reaction: {reaction}"
        );
        self.next()
    }

    fn update_sent_status(&self, update: &StatusUpdate) {
        info!(
            node = %self.name,
            uuid = update.uuid,
            msg_id = %update.message_id,
            status = ?update.status,
            "send status changed"
        );
    }

    fn block_sender(&self, sender: &PublicKey) {
        info!(node = %self.name, sender = %sender.short(), "blocked");
    }

    fn unblock_sender(&self, sender: &PublicKey) {
        info!(node = %self.name, sender = %sender.short(), "unblocked");
    }
}
