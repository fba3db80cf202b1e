//! Compressed service identification hashes (SIH) for push notifications.
//!
//! Partners share a per-pair tag derived from their DH secret. A sender folds
//! the tag, the recipient's identity and the message hash into a short
//! fingerprint that also hides a two-byte metadata field (the message type).
//! The recipient can test a fingerprint against every tag it knows without
//! decrypting the message.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::{KDF_CONTEXT_SIH_EVAL, KDF_CONTEXT_SIH_TAG};
use crate::error::IdentityError;
use crate::identity::{dh_public_from_ed25519, Identity};
use crate::types::{PublicKey, ReceptionId};

const MATCH_LEN: usize = 16;
const METADATA_LEN: usize = 2;

/// Length of a compressed SIH fingerprint.
pub const COMPRESSED_SIH_LEN: usize = MATCH_LEN + METADATA_LEN;

/// Tag shared by `me` and `partner`. Both sides compute the same value.
pub fn make_sih_tag(me: &Identity, partner: &PublicKey) -> Result<String, IdentityError> {
    let partner_dh = dh_public_from_ed25519(partner)?;
    let shared = me.dh_secret().diffie_hellman(&partner_dh);
    Ok(STANDARD.encode(blake3::derive_key(KDF_CONTEXT_SIH_TAG, shared.as_bytes())))
}

fn evaluation_hash(
    identifier: &[u8],
    reception_id: &ReceptionId,
    message_hash: &[u8],
    tag: &str,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_SIH_EVAL);
    hasher.update(identifier);
    hasher.update(reception_id.as_bytes());
    hasher.update(message_hash);
    let key = hasher.finalize();
    *blake3::keyed_hash(key.as_bytes(), tag.as_bytes()).as_bytes()
}

/// Fingerprint a notification for the holder of `identifier`.
pub fn make_compressed_sih(
    identifier: &[u8],
    reception_id: &ReceptionId,
    message_hash: &[u8],
    tag: &str,
    metadata: [u8; METADATA_LEN],
) -> [u8; COMPRESSED_SIH_LEN] {
    let h = evaluation_hash(identifier, reception_id, message_hash, tag);
    let mut fp = [0u8; COMPRESSED_SIH_LEN];
    fp[..MATCH_LEN].copy_from_slice(&h[..MATCH_LEN]);
    for i in 0..METADATA_LEN {
        fp[MATCH_LEN + i] = metadata[i] ^ h[MATCH_LEN + i];
    }
    fp
}

/// Tags that matched a fingerprint, plus the recovered metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SihMatch {
    pub tags: HashSet<String>,
    pub metadata: [u8; METADATA_LEN],
}

/// Test `identity_fp` against every tag in `tags`. `None` when nothing matches
/// or the fingerprint has the wrong length.
pub fn evaluate_compressed_sih(
    identifier: &[u8],
    reception_id: &ReceptionId,
    message_hash: &[u8],
    tags: &[String],
    identity_fp: &[u8],
) -> Option<SihMatch> {
    if identity_fp.len() != COMPRESSED_SIH_LEN {
        return None;
    }

    let mut matched = HashSet::new();
    let mut metadata = [0u8; METADATA_LEN];
    for tag in tags {
        let h = evaluation_hash(identifier, reception_id, message_hash, tag);
        if h[..MATCH_LEN] == identity_fp[..MATCH_LEN] {
            for i in 0..METADATA_LEN {
                metadata[i] = identity_fp[MATCH_LEN + i] ^ h[MATCH_LEN + i];
            }
            matched.insert(tag.clone());
        }
    }

    if matched.is_empty() {
        None
    } else {
        Some(SihMatch {
            tags: matched,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    #[test]
    fn test_tag_is_symmetric() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_eq!(
            make_sih_tag(&a, &b.public_key()).unwrap(),
            make_sih_tag(&b, &a.public_key()).unwrap()
        );
    }

    #[test]
    fn test_compressed_sih_match_recovers_metadata() {
        let a = Identity::generate();
        let b = Identity::generate();
        let c = Identity::generate();
        let tag_ab = make_sih_tag(&a, &b.public_key()).unwrap();
        let tag_bc = make_sih_tag(&b, &c.public_key()).unwrap();

        let identifier = b.public_key();
        let rid = b.reception_id();
        let fp = make_compressed_sih(
            identifier.as_bytes(),
            &rid,
            b"message-hash",
            &tag_ab,
            MessageType::Reply.to_notification_bytes(),
        );

        let found = evaluate_compressed_sih(
            identifier.as_bytes(),
            &rid,
            b"message-hash",
            &[tag_bc.clone(), tag_ab.clone()],
            &fp,
        )
        .unwrap();
        assert!(found.tags.contains(&tag_ab));
        assert!(!found.tags.contains(&tag_bc));
        assert_eq!(
            MessageType::from_notification_bytes(found.metadata),
            MessageType::Reply
        );
    }

    #[test]
    fn test_compressed_sih_no_match() {
        let a = Identity::generate();
        let b = Identity::generate();
        let tag = make_sih_tag(&a, &b.public_key()).unwrap();
        let rid = b.reception_id();
        let fp = make_compressed_sih(b"id", &rid, b"hash", &tag, [1, 0]);

        assert!(evaluate_compressed_sih(b"id", &rid, b"other-hash", &[tag.clone()], &fp).is_none());
        assert!(evaluate_compressed_sih(b"id", &rid, b"hash", &[tag], &fp[..4]).is_none());
    }
}
