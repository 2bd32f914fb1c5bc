//! SHA-256 message padding, reproduced outside the circuit
//!
//! The circuit hashes a fixed-capacity buffer and needs to know where the
//! real padding ends and the constant zero fill begins, so both the buffer
//! and the block-aligned length are produced here.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Length of the big-endian bit-length trailer
const LENGTH_TRAILER: usize = 8;

/// Output of [`ShaPadding::pad`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedMessage {
    /// Padded message, zero-filled to the circuit capacity
    pub bytes: Vec<u8>,
    /// Length of the message plus SHA padding, before zero fill
    pub padded_len: usize,
}

/// Padding parameters of the circuit's hash gadget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaPadding {
    pub block_size: usize,
    /// Fixed message capacity of the circuit
    pub max_len: usize,
}

impl Default for ShaPadding {
    fn default() -> Self {
        Self {
            block_size: 64,
            max_len: 2048,
        }
    }
}

impl ShaPadding {
    pub fn new(block_size: usize, max_len: usize) -> Self {
        Self { block_size, max_len }
    }

    /// Pad `message` and zero-fill it to `max_len`.
    pub fn pad(&self, message: &[u8]) -> Result<PaddedMessage, PipelineError> {
        let mut bytes = pad_block_aligned(message, self.block_size);
        let padded_len = bytes.len();

        if padded_len > self.max_len {
            return Err(PipelineError::MessageTooLong {
                padded: padded_len,
                capacity: self.max_len,
            });
        }

        bytes.resize(self.max_len, 0);
        Ok(PaddedMessage { bytes, padded_len })
    }
}

/// Standard Merkle–Damgård padding: `0x80`, the minimal zero fill, then the
/// message bit length as a big-endian `u64`.
pub fn pad_block_aligned(message: &[u8], block_size: usize) -> Vec<u8> {
    let used = (message.len() + 1 + LENGTH_TRAILER) % block_size;
    let zeros = (block_size - used) % block_size;

    let mut bytes = Vec::with_capacity(message.len() + 1 + zeros + LENGTH_TRAILER);
    bytes.extend_from_slice(message);
    bytes.push(0x80);
    bytes.resize(bytes.len() + zeros, 0);
    bytes.extend_from_slice(&((message.len() as u64) * 8).to_be_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn trailer(bytes: &[u8]) -> u64 {
        let tail: [u8; 8] = bytes[bytes.len() - 8..].try_into().unwrap();
        u64::from_be_bytes(tail)
    }

    #[test]
    fn test_empty_message() {
        let padded = pad_block_aligned(b"", 64);
        assert_eq!(padded.len(), 64);
        assert_eq!(padded[0], 0x80);
        assert!(padded[1..56].iter().all(|b| *b == 0));
        assert_eq!(trailer(&padded), 0);
    }

    #[test]
    fn test_abc_matches_fips_180_example() {
        let padded = pad_block_aligned(b"abc", 64);
        assert_eq!(padded.len(), 64);
        assert_eq!(&padded[..4], &[b'a', b'b', b'c', 0x80]);
        assert_eq!(trailer(&padded), 24);
    }

    #[test]
    fn test_boundary_lengths_spill_into_next_block() {
        // 55 bytes fit one block exactly, 56 need a second
        assert_eq!(pad_block_aligned(&[0x61; 55], 64).len(), 64);
        assert_eq!(pad_block_aligned(&[0x61; 56], 64).len(), 128);
        assert_eq!(pad_block_aligned(&[0x61; 64], 64).len(), 128);
    }

    #[test]
    fn test_random_messages_are_block_aligned() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..600);
            let message: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let padded = pad_block_aligned(&message, 64);

            assert_eq!(padded.len() % 64, 0);
            assert_eq!(&padded[..len], &message[..]);
            assert_eq!(padded[len], 0x80);
            assert_eq!(trailer(&padded), len as u64 * 8);
            // minimal: removing one block would not leave room for 0x80 + trailer
            assert!(padded.len() - len < 64 + 9);
        }
    }

    #[test]
    fn test_pad_fills_to_capacity() {
        let padding = ShaPadding::new(64, 256);
        let padded = padding.pad(b"header.claims").unwrap();

        assert_eq!(padded.bytes.len(), 256);
        assert_eq!(padded.padded_len, 64);
        assert_eq!(trailer(&padded.bytes[..padded.padded_len]), 13 * 8);
        assert!(padded.bytes[64..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pad_rejects_message_over_capacity() {
        let padding = ShaPadding::new(64, 128);
        assert!(padding.pad(&[0u8; 119]).is_ok());

        let err = padding.pad(&[0u8; 120]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MessageTooLong {
                padded: 192,
                capacity: 128
            }
        ));
    }
}
