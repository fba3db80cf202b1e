//! The interface a UI or message database implements to receive DM events.

use chrono::{DateTime, Utc};

use murmur_net::Round;
use murmur_shared::types::{MessageId, MessageType, PublicKey, Status};

/// Metadata common to every message handed to an [`EventModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub message_id: MessageId,
    pub message_type: MessageType,
    pub nickname: String,
    /// The other side of the conversation
    pub partner_key: PublicKey,
    /// Who wrote the message. Equal to `partner_key` for inbound messages
    pub sender_key: PublicKey,
    /// The partner's DM token
    pub dm_token: u32,
    pub timestamp: DateTime<Utc>,
    /// Round the message arrived on. `None` for sends not yet on the network
    pub round: Option<Round>,
    pub status: Status,
}

/// A status change for a message this client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Handle returned by the event model when the send was first surfaced
    pub uuid: u64,
    pub message_id: MessageId,
    pub timestamp: Option<DateTime<Utc>>,
    pub round: Option<Round>,
    pub status: Status,
}

/// Receives decoded direct messages and send-status updates.
///
/// Every `receive*` method returns a handle the model uses to identify the
/// stored message. The send tracker passes it back in [`StatusUpdate::uuid`].
pub trait EventModel: Send + Sync {
    /// A message of a type without dedicated handling.
    fn receive(&self, info: &MessageInfo, payload: &[u8]) -> u64;

    fn receive_text(&self, info: &MessageInfo, text: &str) -> u64;

    fn receive_reply(&self, info: &MessageInfo, reply_to: &MessageId, text: &str) -> u64;

    fn receive_reaction(&self, info: &MessageInfo, react_to: &MessageId, reaction: &str) -> u64;

    fn update_sent_status(&self, update: &StatusUpdate);

    fn block_sender(&self, sender: &PublicKey);

    fn unblock_sender(&self, sender: &PublicKey);
}
