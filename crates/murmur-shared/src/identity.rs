use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as DhPublicKey, StaticSecret};

use crate::constants::{KDF_CONTEXT_DM_TOKEN, RECEPTION_ID_LEN, RECEPTION_ID_TYPE_USER};
use crate::error::IdentityError;
use crate::types::{PublicKey, ReceptionId};

/// A user's long-term DM identity based on Ed25519.
///
/// The public key serves as the user ID. Diffie-Hellman keys for the DM
/// cipher are derived from it with the standard Edwards to Montgomery map,
/// so partners only ever exchange the Ed25519 public key and a DM token.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

/// Serializable format for storing/exporting identity
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub secret_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restore identity from secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        Self { signing_key }
    }

    /// Restore identity from a serialized export
    pub fn from_export(export: &IdentityExport) -> Self {
        Self::from_secret_bytes(&export.secret_key)
    }

    /// Export identity for serialization
    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            secret_key: *self.signing_key.as_bytes(),
            public_key: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Get the user's public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// X25519 secret used by the DM cipher
    pub fn dh_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }

    /// X25519 public key matching [`Identity::dh_secret`]
    pub fn dh_public(&self) -> DhPublicKey {
        DhPublicKey::from(&self.dh_secret())
    }

    /// Opaque discriminator mixed into this identity's reception IDs.
    pub fn dm_token(&self) -> u32 {
        let hash = blake3::derive_key(KDF_CONTEXT_DM_TOKEN, self.signing_key.as_bytes());
        u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
    }

    /// Reception ID partners address their messages to.
    pub fn reception_id(&self) -> ReceptionId {
        derive_reception_id(self.dh_public().as_bytes(), self.dm_token())
    }

    /// Reception ID for self-addressed copies. Derived from the secret so
    /// nobody else can compute it.
    pub fn self_reception_id(&self) -> ReceptionId {
        derive_reception_id(&self.dh_secret().to_bytes(), self.dm_token())
    }
}

/// Convert a partner's Ed25519 public key into the X25519 key the DM cipher uses.
pub fn dh_public_from_ed25519(key: &PublicKey) -> Result<DhPublicKey, IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| IdentityError::InvalidKeyBytes)?;
    Ok(DhPublicKey::from(verifying_key.to_montgomery().to_bytes()))
}

/// Reception ID a partner listens on, given their public key and DM token.
pub fn partner_reception_id(key: &PublicKey, token: u32) -> Result<ReceptionId, IdentityError> {
    let dh = dh_public_from_ed25519(key)?;
    Ok(derive_reception_id(dh.as_bytes(), token))
}

/// hash(key || big-endian token) followed by the user type byte.
pub fn derive_reception_id(key_bytes: &[u8], token: u32) -> ReceptionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key_bytes);
    hasher.update(&token.to_be_bytes());
    let hash = hasher.finalize();

    let mut id = [0u8; RECEPTION_ID_LEN];
    id[..32].copy_from_slice(hash.as_bytes());
    id[32] = RECEPTION_ID_TYPE_USER;
    ReceptionId(id)
}
