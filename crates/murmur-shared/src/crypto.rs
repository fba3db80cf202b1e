//! Authenticated encryption for direct messages.
//!
//! Two modes are provided. The partner mode is a one-way handshake in the
//! spirit of Noise X: an ephemeral X25519 key seals the sender's static public
//! key, and the payload key mixes in a second DH between both static keys.
//! The self mode encrypts for the sender alone under a key derived from their
//! secret, while still recording which partner the message was meant for.
//!
//! Both modes produce ciphertext of an exact, caller-chosen length. The
//! plaintext is length-prefixed and padded with random bytes inside the AEAD.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use x25519_dalek::{PublicKey as DhPublicKey, StaticSecret};

use crate::constants::{
    KDF_CONTEXT_DM_PAYLOAD, KDF_CONTEXT_DM_SELF, KDF_CONTEXT_DM_STATIC, NONCE_SIZE, PUBKEY_SIZE,
    TAG_SIZE,
};
use crate::error::CipherError;
use crate::identity::{dh_public_from_ed25519, Identity};
use crate::types::PublicKey;

pub type SymmetricKey = [u8; 32];

const LENGTH_PREFIX: usize = 2;
const SELF_MARKER_LEN: usize = 16;

/// eph_pub || sealed static key || payload tag
pub const PARTNER_OVERHEAD: usize = PUBKEY_SIZE + (PUBKEY_SIZE + TAG_SIZE) + TAG_SIZE;

/// nonce || marker || partner key || payload tag
pub const SELF_OVERHEAD: usize = NONCE_SIZE + SELF_MARKER_LEN + PUBKEY_SIZE + TAG_SIZE;

/// Encryption capability used by the DM layer.
///
/// Implementations must produce ciphertext of exactly `exact_len` bytes so
/// every frame on the wire has the same size.
pub trait Cipher: Send + Sync {
    /// Encrypt for `partner`. Only the partner can decrypt.
    fn encrypt(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError>;

    /// Decrypt a partner-mode ciphertext, returning the sender's key.
    fn decrypt(&self, ciphertext: &[u8], me: &Identity)
        -> Result<(PublicKey, Vec<u8>), CipherError>;

    /// Encrypt a copy only `me` can read, bound to `partner`.
    fn encrypt_self(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError>;

    /// Decrypt a self-mode ciphertext, returning the recorded partner key.
    fn decrypt_self(
        &self,
        ciphertext: &[u8],
        me: &Identity,
    ) -> Result<(PublicKey, Vec<u8>), CipherError>;

    /// Cheap check for whether `ciphertext` was produced by
    /// [`Cipher::encrypt_self`] under `me`.
    fn is_self_encrypted(&self, ciphertext: &[u8], me: &Identity) -> bool;
}

/// Default [`Cipher`] built on X25519, BLAKE3 and XChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmCipher;

impl Cipher for DmCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError> {
        let inner_len = inner_capacity(exact_len, PARTNER_OVERHEAD, plaintext.len())?;
        let partner_dh = dh_public_from_ed25519(partner).map_err(|_| CipherError::InvalidKey)?;

        let mut eph_bytes = [0u8; 32];
        fill(rng, &mut eph_bytes)?;
        let eph_secret = StaticSecret::from(eph_bytes);
        let eph_public = DhPublicKey::from(&eph_secret);

        let dh1 = eph_secret.diffie_hellman(&partner_dh);
        let k1 = derive_static_key(dh1.as_bytes(), eph_public.as_bytes());
        let sealed_static = seal(&k1, &[0u8; NONCE_SIZE], me.public_key().as_bytes())?;

        let dh2 = me.dh_secret().diffie_hellman(&partner_dh);
        let k2 = derive_payload_key(&k1, dh2.as_bytes());
        let body = seal(&k2, &[0u8; NONCE_SIZE], &pad(plaintext, inner_len, rng)?)?;

        let mut out = Vec::with_capacity(exact_len);
        out.extend_from_slice(eph_public.as_bytes());
        out.extend_from_slice(&sealed_static);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        me: &Identity,
    ) -> Result<(PublicKey, Vec<u8>), CipherError> {
        if ciphertext.len() < PARTNER_OVERHEAD + LENGTH_PREFIX {
            return Err(CipherError::DecryptionFailed);
        }
        let (eph, rest) = ciphertext.split_at(PUBKEY_SIZE);
        let (sealed_static, body) = rest.split_at(PUBKEY_SIZE + TAG_SIZE);

        let mut eph_bytes = [0u8; PUBKEY_SIZE];
        eph_bytes.copy_from_slice(eph);
        let eph_public = DhPublicKey::from(eph_bytes);

        let secret = me.dh_secret();
        let dh1 = secret.diffie_hellman(&eph_public);
        let k1 = derive_static_key(dh1.as_bytes(), eph_public.as_bytes());
        let sender_bytes = open(&k1, &[0u8; NONCE_SIZE], sealed_static)?;
        let sender = PublicKey(
            sender_bytes
                .try_into()
                .map_err(|_| CipherError::DecryptionFailed)?,
        );

        let sender_dh = dh_public_from_ed25519(&sender).map_err(|_| CipherError::InvalidKey)?;
        let dh2 = secret.diffie_hellman(&sender_dh);
        let k2 = derive_payload_key(&k1, dh2.as_bytes());
        let inner = open(&k2, &[0u8; NONCE_SIZE], body)?;

        Ok((sender, unpad(&inner)?))
    }

    fn encrypt_self(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError> {
        let inner_len =
            inner_capacity(exact_len, SELF_OVERHEAD, plaintext.len())? + PUBKEY_SIZE;
        let key = self_key(me);

        let mut nonce = [0u8; NONCE_SIZE];
        fill(rng, &mut nonce)?;

        let mut inner = Vec::with_capacity(inner_len);
        inner.extend_from_slice(partner.as_bytes());
        inner.extend_from_slice(&pad(plaintext, inner_len - PUBKEY_SIZE, rng)?);
        let body = seal(&key, &nonce, &inner)?;

        let mut out = Vec::with_capacity(exact_len);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&self_marker(&key, &nonce));
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decrypt_self(
        &self,
        ciphertext: &[u8],
        me: &Identity,
    ) -> Result<(PublicKey, Vec<u8>), CipherError> {
        if !self.is_self_encrypted(ciphertext, me) {
            return Err(CipherError::DecryptionFailed);
        }
        let key = self_key(me);
        let (nonce, rest) = ciphertext.split_at(NONCE_SIZE);
        let body = &rest[SELF_MARKER_LEN..];

        let inner = open(&key, nonce, body)?;
        if inner.len() < PUBKEY_SIZE + LENGTH_PREFIX {
            return Err(CipherError::DecryptionFailed);
        }
        let (partner_bytes, padded) = inner.split_at(PUBKEY_SIZE);
        let mut partner = [0u8; PUBKEY_SIZE];
        partner.copy_from_slice(partner_bytes);

        Ok((PublicKey(partner), unpad(padded)?))
    }

    fn is_self_encrypted(&self, ciphertext: &[u8], me: &Identity) -> bool {
        if ciphertext.len() < SELF_OVERHEAD + LENGTH_PREFIX {
            return false;
        }
        let key = self_key(me);
        let nonce = &ciphertext[..NONCE_SIZE];
        let marker = &ciphertext[NONCE_SIZE..NONCE_SIZE + SELF_MARKER_LEN];
        self_marker(&key, nonce) == marker
    }
}

/// Room left for the padded plaintext once `overhead` is accounted for.
fn inner_capacity(exact_len: usize, overhead: usize, plaintext_len: usize) -> Result<usize, CipherError> {
    let inner = exact_len.saturating_sub(overhead);
    if plaintext_len + LENGTH_PREFIX > inner || plaintext_len > u16::MAX as usize {
        return Err(CipherError::PlaintextTooLong {
            len: plaintext_len,
            capacity: inner.saturating_sub(LENGTH_PREFIX),
        });
    }
    Ok(inner)
}

fn fill(rng: &mut dyn RngCore, buf: &mut [u8]) -> Result<(), CipherError> {
    rng.try_fill_bytes(buf)
        .map_err(|e| CipherError::Rng(e.to_string()))
}

// u16 BE length || plaintext || random padding, exactly `len` bytes
fn pad(plaintext: &[u8], len: usize, rng: &mut dyn RngCore) -> Result<Vec<u8>, CipherError> {
    let mut out = vec![0u8; len];
    out[..LENGTH_PREFIX].copy_from_slice(&(plaintext.len() as u16).to_be_bytes());
    let end = LENGTH_PREFIX + plaintext.len();
    out[LENGTH_PREFIX..end].copy_from_slice(plaintext);
    if end < len {
        fill(rng, &mut out[end..])?;
    }
    Ok(out)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>, CipherError> {
    if padded.len() < LENGTH_PREFIX {
        return Err(CipherError::DecryptionFailed);
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    padded
        .get(LENGTH_PREFIX..LENGTH_PREFIX + len)
        .map(|b| b.to_vec())
        .ok_or(CipherError::DecryptionFailed)
}

fn seal(key: &SymmetricKey, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)
}

fn open(key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)
}

fn derive_static_key(shared: &[u8], eph_public: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_DM_STATIC);
    hasher.update(shared);
    hasher.update(eph_public);
    *hasher.finalize().as_bytes()
}

fn derive_payload_key(k1: &SymmetricKey, shared: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_DM_PAYLOAD);
    hasher.update(k1);
    hasher.update(shared);
    *hasher.finalize().as_bytes()
}

fn self_key(me: &Identity) -> SymmetricKey {
    blake3::derive_key(KDF_CONTEXT_DM_SELF, &me.dh_secret().to_bytes())
}

fn self_marker(key: &SymmetricKey, nonce: &[u8]) -> [u8; SELF_MARKER_LEN] {
    let hash = blake3::keyed_hash(key, nonce);
    let mut marker = [0u8; SELF_MARKER_LEN];
    marker.copy_from_slice(&hash.as_bytes()[..SELF_MARKER_LEN]);
    marker
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const LEN: usize = 512;

    #[test]
    fn test_partner_roundtrip() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let ct = DmCipher
            .encrypt(b"Hi", &alice, &bob.public_key(), &mut OsRng, LEN)
            .unwrap();
        assert_eq!(ct.len(), LEN);

        let (sender, plaintext) = DmCipher.decrypt(&ct, &bob).unwrap();
        assert_eq!(sender, alice.public_key());
        assert_eq!(plaintext, b"Hi");
    }

    #[test]
    fn test_partner_ciphertext_unreadable_by_third_party() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let eve = Identity::generate();

        let ct = DmCipher
            .encrypt(b"secret", &alice, &bob.public_key(), &mut OsRng, LEN)
            .unwrap();
        assert!(DmCipher.decrypt(&ct, &eve).is_err());
        assert!(!DmCipher.is_self_encrypted(&ct, &alice));
        assert!(!DmCipher.is_self_encrypted(&ct, &bob));
    }

    #[test]
    fn test_self_roundtrip() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let ct = DmCipher
            .encrypt_self(b"note to self", &alice, &bob.public_key(), &mut OsRng, LEN)
            .unwrap();
        assert_eq!(ct.len(), LEN);
        assert!(DmCipher.is_self_encrypted(&ct, &alice));
        assert!(!DmCipher.is_self_encrypted(&ct, &bob));

        let (partner, plaintext) = DmCipher.decrypt_self(&ct, &alice).unwrap();
        assert_eq!(partner, bob.public_key());
        assert_eq!(plaintext, b"note to self");
        assert!(DmCipher.decrypt(&ct, &bob).is_err());
    }

    #[test]
    fn test_exact_fit_and_overflow() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let fits = vec![7u8; LEN - PARTNER_OVERHEAD - LENGTH_PREFIX];
        let ct = DmCipher
            .encrypt(&fits, &alice, &bob.public_key(), &mut OsRng, LEN)
            .unwrap();
        assert_eq!(DmCipher.decrypt(&ct, &bob).unwrap().1, fits);

        let too_long = vec![7u8; fits.len() + 1];
        assert!(matches!(
            DmCipher.encrypt(&too_long, &alice, &bob.public_key(), &mut OsRng, LEN),
            Err(CipherError::PlaintextTooLong { .. })
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let mut ct = DmCipher
            .encrypt(b"data", &alice, &bob.public_key(), &mut OsRng, LEN)
            .unwrap();
        ct[LEN - 1] ^= 0xFF;
        assert!(DmCipher.decrypt(&ct, &bob).is_err());
    }

    #[test]
    fn test_short_input_is_not_self_encrypted() {
        let alice = Identity::generate();
        assert!(!DmCipher.is_self_encrypted(&[], &alice));
        assert!(DmCipher.decrypt(&[0u8; 10], &alice).is_err());
    }
}
