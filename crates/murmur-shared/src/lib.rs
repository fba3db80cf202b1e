//! # murmur-shared
//!
//! Types, key material and wire formats shared by every murmur crate: message
//! and reception identities, transport framing, the direct-message envelope,
//! the DM cipher and notification fingerprints.

pub mod constants;
pub mod crypto;
pub mod emoji;
pub mod error;
pub mod framing;
pub mod identity;
pub mod protocol;
pub mod sih;
pub mod timestamp;
pub mod types;

pub use crypto::{Cipher, DmCipher};
pub use error::{CipherError, FrameError, IdentityError, ReactionError};
pub use identity::Identity;
pub use types::*;
