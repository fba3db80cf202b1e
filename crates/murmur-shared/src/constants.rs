/// Application name
pub const APP_NAME: &str = "murmur";

/// Length of the transport frame's key fingerprint field in bytes
pub const KEY_FP_LEN: usize = 32;

/// Length of the transport frame's MAC field in bytes
pub const MAC_LEN: usize = 32;

/// Length of a derived message identity in bytes
pub const MESSAGE_ID_LEN: usize = 32;

/// Size of the random nonce mixed into every message identity
pub const MESSAGE_NONCE_LEN: usize = 4;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Reception identities are a 32-byte hash followed by a one-byte type tag
pub const RECEPTION_ID_LEN: usize = 33;

/// Type tag appended to reception identities belonging to users
pub const RECEPTION_ID_TYPE_USER: u8 = 0x02;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Prefix used by the textual (logging) form of a message identity
pub const MESSAGE_ID_PREFIX: &str = "DMMsgID-";

/// Version tags carried inside the text and reaction sub-messages
pub const TEXT_VERSION: u32 = 0;
pub const REACTION_VERSION: u32 = 0;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_DM_STATIC: &str = "murmur-dm-static-key-v1";
pub const KDF_CONTEXT_DM_PAYLOAD: &str = "murmur-dm-payload-key-v1";
pub const KDF_CONTEXT_DM_SELF: &str = "murmur-dm-self-key-v1";
pub const KDF_CONTEXT_DM_TOKEN: &str = "murmur-dm-token-v1";
pub const KDF_CONTEXT_SIH_TAG: &str = "murmur-sih-tag-v1";
pub const KDF_CONTEXT_SIH_EVAL: &str = "murmur-sih-eval-v1";
pub const KDF_CONTEXT_TIMESTAMP: &str = "murmur-timestamp-mutation-v1";
