use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::{MESSAGE_ID_LEN, MESSAGE_NONCE_LEN, REACTION_VERSION, TEXT_VERSION};
use crate::types::{MessageId, MessageType, PublicKey};

/// Base tags used when building a debug tag for a send.
pub const SEND_MESSAGE_TAG: &str = "Message";
pub const SEND_REPLY_TAG: &str = "Reply";
pub const SEND_REACTION_TAG: &str = "Reaction";

/// Plaintext envelope of every direct message.
///
/// The partner-addressed and self-addressed copies of one send carry the same
/// payload, type, nickname, nonce and timestamp, so both derive the same
/// [`MessageId`]. Only the round fields and the DM token differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Round of the partner-addressed copy
    pub round_id: u64,
    /// Round of the self-addressed copy
    pub self_round_id: u64,
    pub payload_type: u32,
    pub payload: Vec<u8>,
    pub nickname: String,
    /// Sender's token on the partner copy, the partner's token on the self copy
    pub dm_token: u32,
    pub nonce: [u8; MESSAGE_NONCE_LEN],
    /// Sender's local clock, nanoseconds since the Unix epoch
    pub local_timestamp: i64,
}

impl DirectMessage {
    pub fn message_type(&self) -> MessageType {
        MessageType::from(self.payload_type)
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Content-derived identity of this message.
    ///
    /// hash(payload || u32 LE type || nickname || nonce || i64 LE timestamp)
    pub fn derive_message_id(&self) -> MessageId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.payload);
        hasher.update(&self.payload_type.to_le_bytes());
        hasher.update(self.nickname.as_bytes());
        hasher.update(&self.nonce);
        hasher.update(&self.local_timestamp.to_le_bytes());
        MessageId(*hasher.finalize().as_bytes())
    }
}

/// Body of text and reply messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub version: u32,
    pub text: String,
    /// Raw bytes of the message being replied to, empty for plain text
    pub reply_message_id: Vec<u8>,
}

impl Text {
    pub fn new(text: &str) -> Self {
        Self {
            version: TEXT_VERSION,
            text: text.to_string(),
            reply_message_id: Vec::new(),
        }
    }

    pub fn reply(text: &str, reply_to: &MessageId) -> Self {
        Self {
            version: TEXT_VERSION,
            text: text.to_string(),
            reply_message_id: reply_to.as_bytes().to_vec(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// True when a reply target is present. An empty field or an all-zero
    /// ID counts as absent; any other width is reported as present so the
    /// receiver can reject it.
    pub fn has_reply_target(&self) -> bool {
        !self.reply_message_id.is_empty() && self.reply_message_id != [0u8; MESSAGE_ID_LEN]
    }
}

/// Body of reaction messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub version: u32,
    pub reaction: String,
    pub reaction_message_id: Vec<u8>,
}

impl Reaction {
    pub fn new(reaction: &str, react_to: &MessageId) -> Self {
        Self {
            version: REACTION_VERSION,
            reaction: reaction.to_string(),
            reaction_message_id: react_to.as_bytes().to_vec(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Non-unique identifier for tracing a send through the logs.
pub fn make_debug_tag(partner: &PublicKey, msg: &[u8], base_tag: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(msg);
    hasher.update(partner.as_bytes());
    let trip_code = STANDARD_NO_PAD.encode(hasher.finalize().as_bytes());
    format!("{}-{}", base_tag, &trip_code[..12])
}
