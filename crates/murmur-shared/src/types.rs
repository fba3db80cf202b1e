use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::{MESSAGE_ID_LEN, MESSAGE_ID_PREFIX, RECEPTION_ID_LEN};
use crate::error::IdentityError;

// User identity = Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Storage element name: unpadded standard base64.
    pub fn to_element_name(&self) -> String {
        STANDARD_NO_PAD.encode(self.0)
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        let bytes = STANDARD_NO_PAD.decode(name).ok()?;
        bytes.try_into().ok().map(Self)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identity of a direct message, identical on the sender, the partner and
/// the sender's self-addressed copy.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MessageId(pub [u8; MESSAGE_ID_LEN]);

impl MessageId {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; MESSAGE_ID_LEN] =
            bytes
                .try_into()
                .map_err(|_| IdentityError::InvalidMessageIdLength {
                    expected: MESSAGE_ID_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", MESSAGE_ID_PREFIX, STANDARD.encode(self.0))
    }
}

impl std::fmt::Debug for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Address a frame is delivered to on the mix network.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceptionId(pub [u8; RECEPTION_ID_LEN]);

impl ReceptionId {
    pub fn as_bytes(&self) -> &[u8; RECEPTION_ID_LEN] {
        &self.0
    }
}

impl std::fmt::Display for ReceptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", STANDARD.encode(self.0))
    }
}

impl std::fmt::Debug for ReceptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceptionId({})", self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short-lived network-level address chosen by the transport for one send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct EphemeralId(pub i64);

/// Payload type tag carried in every direct message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "u32", into = "u32")]
pub enum MessageType {
    Text,
    Reply,
    Reaction,
    Invitation,
    Silent,
    Delete,
    Unknown(u32),
}

impl MessageType {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Text => 1,
            Self::Reply => 2,
            Self::Reaction => 3,
            Self::Invitation => 4,
            Self::Silent => 5,
            Self::Delete => 6,
            Self::Unknown(raw) => raw,
        }
    }

    /// Two-byte form carried in notification metadata.
    pub fn to_notification_bytes(self) -> [u8; 2] {
        (self.as_u32() as u16).to_le_bytes()
    }

    pub fn from_notification_bytes(b: [u8; 2]) -> Self {
        Self::from(u16::from_le_bytes(b) as u32)
    }
}

impl From<u32> for MessageType {
    fn from(raw: u32) -> Self {
        match raw {
            1 => Self::Text,
            2 => Self::Reply,
            3 => Self::Reaction,
            4 => Self::Invitation,
            5 => Self::Silent,
            6 => Self::Delete,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u32 {
    fn from(mt: MessageType) -> Self {
        mt.as_u32()
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::Reply => write!(f, "Reply"),
            Self::Reaction => write!(f, "Reaction"),
            Self::Invitation => write!(f, "Invitation"),
            Self::Silent => write!(f, "Silent"),
            Self::Delete => write!(f, "Delete"),
            Self::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// Delivery status of a message as reported to the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Unsent = 0,
    Sent = 1,
    Received = 2,
    Failed = 3,
}

impl Status {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Unsent),
            1 => Some(Self::Sent),
            2 => Some(Self::Received),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_raw_values() {
        for raw in 0u32..10 {
            assert_eq!(MessageType::from(raw).as_u32(), raw);
        }
        assert_eq!(MessageType::from(3), MessageType::Reaction);
        assert_eq!(MessageType::from(40_000), MessageType::Unknown(40_000));
    }

    #[test]
    fn test_message_type_notification_bytes() {
        let b = MessageType::Reply.to_notification_bytes();
        assert_eq!(b, [2, 0]);
        assert_eq!(MessageType::from_notification_bytes(b), MessageType::Reply);
    }

    #[test]
    fn test_message_id_display_prefix() {
        let id = MessageId([0u8; 32]);
        let s = id.to_string();
        assert!(s.starts_with(MESSAGE_ID_PREFIX));
        assert!(s.ends_with('='));
    }

    #[test]
    fn test_message_id_from_slice_wrong_length() {
        assert!(MessageId::from_slice(&[1u8; 31]).is_err());
        assert!(MessageId::from_slice(&[1u8; 32]).is_ok());
    }

    #[test]
    fn test_public_key_element_name() {
        let key = PublicKey([7u8; 32]);
        let name = key.to_element_name();
        assert!(!name.ends_with('='));
        assert_eq!(PublicKey::from_element_name(&name), Some(key));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = PublicKey([0xAB; 32]);
        assert_eq!(PublicKey::from_hex(&key.to_hex()).unwrap(), key);
        assert_eq!(key.short(), "abababab");
    }
}
