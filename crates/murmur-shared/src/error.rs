use thiserror::Error;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Plaintext of {len} bytes does not fit in a {capacity}-byte ciphertext")]
    PlaintextTooLong { len: usize, capacity: usize },

    #[error("Invalid key bytes")]
    InvalidKey,

    #[error("Random number generator failure: {0}")]
    Rng(String),
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Ciphertext of {len} bytes exceeds frame capacity of {capacity} bytes")]
    TooLong { len: usize, capacity: usize },

    #[error("Frame capacity {0} is smaller than the fingerprint and MAC fields")]
    CapacityTooSmall(usize),

    #[error("Random number generator failure: {0}")]
    Rng(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReactionError {
    #[error("Reaction is empty")]
    Empty,

    #[error("Reaction must be a single emoji, got {0} graphemes")]
    TooManyCharacters(usize),

    #[error("Reaction contains a non-emoji character {0:?}")]
    NotEmoji(char),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid message ID length: expected {expected}, got {got}")]
    InvalidMessageIdLength { expected: usize, got: usize },
}
