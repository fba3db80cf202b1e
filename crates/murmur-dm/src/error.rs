use thiserror::Error;

use murmur_net::NetError;
use murmur_shared::error::{CipherError, FrameError, IdentityError, ReactionError};
use murmur_shared::types::{MessageId, PublicKey};
use murmur_store::StoreError;

#[derive(Error, Debug)]
pub enum DmError {
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Invalid reaction: {0}")]
    Reaction(#[from] ReactionError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Building the partner-addressed copy failed.
    #[error("Partner send failed: {0}")]
    PartnerSend(#[source] Box<DmError>),

    /// Building the self-addressed copy failed.
    #[error("Self send failed: {0}")]
    SelfSend(#[source] Box<DmError>),

    #[error("Random number generator failure: {0}")]
    Rng(String),

    #[error("No pending send with handle {0}")]
    UnknownPendingSend(u64),

    #[error("Message {0} is already tracked as sent")]
    AlreadySent(MessageId),

    #[error("Reply target has invalid length {0}")]
    MalformedReplyId(usize),

    #[error("Reaction target has invalid length {0}")]
    MalformedReactionTarget(usize),

    #[error("Invalid nickname: {0}")]
    InvalidNickname(String),

    #[error("No DM conversation with {0}")]
    PartnerNotFound(PublicKey),

    #[error("Send tracker lock poisoned")]
    LockPoisoned,
}

impl DmError {
    /// Recover the DM error an assembler returned through the network layer.
    pub(crate) fn from_network(err: NetError) -> Self {
        match err {
            NetError::Assembly(inner) => match inner.downcast::<DmError>() {
                Ok(dm) => dm,
                Err(other) => DmError::Network(NetError::Assembly(other)),
            },
            other => DmError::Network(other),
        }
    }
}
