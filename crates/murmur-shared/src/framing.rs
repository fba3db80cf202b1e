//! Packing of DM ciphertext into the mix-network transport frame.
//!
//! The transport frame reserves a key fingerprint and a MAC field that direct
//! messages do not use for their usual purpose. Everything but the first byte
//! of each field carries ciphertext, so a DM frame holds
//! `max_contents + MAC_LEN + KEY_FP_LEN - 2` bytes of ciphertext.
//!
//! The first byte of both fields is random with the top bit cleared, as the
//! transport's own fingerprint format requires.

use rand::RngCore;

use crate::constants::{KEY_FP_LEN, MAC_LEN};
use crate::error::FrameError;

/// A transport frame as handed to, and received from, the mix network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fingerprint: [u8; KEY_FP_LEN],
    pub mac: [u8; MAC_LEN],
    pub contents: Vec<u8>,
}

/// Ciphertext budget of a frame whose contents field is `max_contents` bytes.
pub fn payload_capacity(max_contents: usize) -> usize {
    max_contents + MAC_LEN + KEY_FP_LEN - 2
}

/// Split `ciphertext` across the fingerprint, MAC and contents fields of a
/// frame holding `capacity` bytes of ciphertext. Short ciphertext is padded
/// with random bytes.
pub fn pack_frame<R: RngCore + ?Sized>(
    ciphertext: &[u8],
    capacity: usize,
    rng: &mut R,
) -> Result<Frame, FrameError> {
    let header = KEY_FP_LEN - 1 + MAC_LEN - 1;
    if capacity < header {
        return Err(FrameError::CapacityTooSmall(capacity));
    }
    if ciphertext.len() > capacity {
        return Err(FrameError::TooLong {
            len: ciphertext.len(),
            capacity,
        });
    }

    let mut prefix = [0u8; 2];
    rng.try_fill_bytes(&mut prefix)
        .map_err(|e| FrameError::Rng(e.to_string()))?;

    let mut body = vec![0u8; capacity];
    body[..ciphertext.len()].copy_from_slice(ciphertext);
    if ciphertext.len() < capacity {
        rng.try_fill_bytes(&mut body[ciphertext.len()..])
            .map_err(|e| FrameError::Rng(e.to_string()))?;
    }

    let mut fingerprint = [0u8; KEY_FP_LEN];
    let mut mac = [0u8; MAC_LEN];
    fingerprint[0] = prefix[0] & 0x7F;
    mac[0] = prefix[1] & 0x7F;

    let fp_end = KEY_FP_LEN - 1;
    let mac_end = fp_end + MAC_LEN - 1;
    fingerprint[1..].copy_from_slice(&body[..fp_end]);
    mac[1..].copy_from_slice(&body[fp_end..mac_end]);
    let contents = body.split_off(mac_end);

    Ok(Frame {
        fingerprint,
        mac,
        contents,
    })
}

/// Inverse of [`pack_frame`]: `fingerprint[1..] || mac[1..] || contents`.
pub fn unpack_frame(frame: &Frame) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(KEY_FP_LEN - 1 + MAC_LEN - 1 + frame.contents.len());
    out.extend_from_slice(&frame.fingerprint[1..]);
    out.extend_from_slice(&frame.mac[1..]);
    out.extend_from_slice(&frame.contents);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {}
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "entropy source exhausted",
            )))
        }
    }

    #[test]
    fn test_full_length_ciphertext() {
        let capacity = payload_capacity(100);
        let ciphertext: Vec<u8> = (0..capacity).map(|i| (i % 251) as u8).collect();

        let frame = pack_frame(&ciphertext, capacity, &mut OsRng).unwrap();
        assert_eq!(frame.contents.len(), 100);
        assert_eq!(frame.fingerprint[0] & 0x80, 0);
        assert_eq!(frame.mac[0] & 0x80, 0);
        assert_eq!(&frame.fingerprint[1..], &ciphertext[..KEY_FP_LEN - 1]);
        assert_eq!(unpack_frame(&frame), ciphertext);
    }

    #[test]
    fn test_short_ciphertext_is_padded() {
        let capacity = payload_capacity(64);
        let ciphertext = vec![0xEEu8; 10];

        let frame = pack_frame(&ciphertext, capacity, &mut OsRng).unwrap();
        let unpacked = unpack_frame(&frame);
        assert_eq!(unpacked.len(), capacity);
        assert_eq!(&unpacked[..10], &ciphertext[..]);
    }

    #[test]
    fn test_prefix_bytes_always_top_bit_clear() {
        let capacity = payload_capacity(8);
        for _ in 0..64 {
            let frame = pack_frame(&[1, 2, 3], capacity, &mut OsRng).unwrap();
            assert!(frame.fingerprint[0] < 0x80);
            assert!(frame.mac[0] < 0x80);
        }
    }

    #[test]
    fn test_too_long_rejected() {
        let capacity = payload_capacity(4);
        let ciphertext = vec![0u8; capacity + 1];
        assert!(matches!(
            pack_frame(&ciphertext, capacity, &mut OsRng),
            Err(FrameError::TooLong { .. })
        ));
    }

    #[test]
    fn test_rng_failure_is_fatal() {
        let capacity = payload_capacity(16);
        let result = pack_frame(&[9u8; 20], capacity, &mut BrokenRng);
        assert!(matches!(result, Err(FrameError::Rng(_))));
    }
}
