//! Big-integer limb decomposition
//!
//! The circuit works over a ~254-bit prime field, so 2048-bit RSA values are
//! carried as `limb_count` limbs of `limb_bits` bits each, least significant
//! limb first: `value = Σ limb[i] · 2^(limb_bits · i)`.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use super::decode_base64;
use crate::error::PipelineError;

/// Limb width and count for one circuit revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimbLayout {
    /// Bits per limb (`W`)
    pub limb_bits: usize,
    /// Number of limbs (`K`)
    pub limb_count: usize,
}

impl Default for LimbLayout {
    fn default() -> Self {
        Self::RSA_2048
    }
}

impl LimbLayout {
    /// 17 × 121-bit limbs, enough for a 2048-bit modulus
    pub const RSA_2048: Self = Self {
        limb_bits: 121,
        limb_count: 17,
    };

    pub fn new(limb_bits: usize, limb_count: usize) -> Self {
        Self {
            limb_bits,
            limb_count,
        }
    }

    /// Largest bit length representable by this layout
    pub fn capacity_bits(&self) -> usize {
        self.limb_bits * self.limb_count
    }

    /// Split `value` into exactly `limb_count` limbs.
    ///
    /// Fails with `ValueOverflow` when bits remain after the last limb.
    pub fn to_limbs(&self, value: &BigUint) -> Result<Vec<BigUint>, PipelineError> {
        let mask = (BigUint::one() << self.limb_bits) - BigUint::one();
        let mut remaining = value.clone();
        let mut limbs = Vec::with_capacity(self.limb_count);

        for _ in 0..self.limb_count {
            limbs.push(&remaining & &mask);
            remaining >>= self.limb_bits;
        }

        if !remaining.is_zero() {
            return Err(PipelineError::ValueOverflow {
                bits: value.bits(),
                capacity: self.capacity_bits(),
            });
        }

        Ok(limbs)
    }

    /// Reassemble a value from little-limb-first limbs.
    pub fn from_limbs(&self, limbs: &[BigUint]) -> BigUint {
        limbs
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, limb| (acc << self.limb_bits) + limb)
    }

    /// Decode a base64 string and split it into limbs
    pub fn base64_to_limbs(&self, encoded: &str) -> Result<Vec<BigUint>, PipelineError> {
        self.to_limbs(&from_base64(encoded)?)
    }
}

/// Interpret base64-decoded bytes as a big-endian unsigned integer.
///
/// Both the standard and URL-safe alphabets are accepted.
pub fn from_base64(encoded: &str) -> Result<BigUint, PipelineError> {
    let bytes = decode_base64(encoded)
        .map_err(|e| PipelineError::MalformedCredential(format!("invalid base64 integer: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Render limbs as decimal strings for the prover's JSON input.
pub fn to_decimal_strings(limbs: &[BigUint]) -> Vec<String> {
    limbs.iter().map(|limb| limb.to_str_radix(10)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_small_value_occupies_first_limb() {
        let layout = LimbLayout::RSA_2048;
        let limbs = layout.to_limbs(&BigUint::from(65537u32)).unwrap();

        assert_eq!(limbs.len(), 17);
        assert_eq!(limbs[0], BigUint::from(65537u32));
        assert!(limbs[1..].iter().all(|l| l.is_zero()));
    }

    #[test]
    fn test_limb_boundary() {
        let layout = LimbLayout::new(8, 3);
        // 0x01_02_03 → [0x03, 0x02, 0x01]
        let limbs = layout.to_limbs(&BigUint::from(0x010203u32)).unwrap();
        assert_eq!(
            limbs,
            vec![
                BigUint::from(3u8),
                BigUint::from(2u8),
                BigUint::from(1u8)
            ]
        );
    }

    #[test]
    fn test_overflow_is_rejected() {
        let layout = LimbLayout::new(8, 2);
        let err = layout.to_limbs(&BigUint::from(1u32 << 16)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ValueOverflow {
                bits: 17,
                capacity: 16
            }
        ));

        // Exactly at capacity still fits
        assert!(layout.to_limbs(&BigUint::from(0xffffu32)).is_ok());
    }

    #[test]
    fn test_round_trip_random_values() {
        let mut rng = rand::thread_rng();
        for layout in [LimbLayout::RSA_2048, LimbLayout::new(64, 4), LimbLayout::new(7, 9)] {
            for _ in 0..50 {
                let byte_len = rng.gen_range(0..=layout.capacity_bits() / 8);
                let bytes: Vec<u8> = (0..byte_len).map(|_| rng.gen()).collect();
                let value = BigUint::from_bytes_be(&bytes);

                let limbs = layout.to_limbs(&value).unwrap();
                assert_eq!(limbs.len(), layout.limb_count);
                assert!(limbs.iter().all(|l| l.bits() <= layout.limb_bits as u64));
                assert_eq!(layout.from_limbs(&limbs), value);
            }
        }
    }

    #[test]
    fn test_from_base64_is_big_endian() {
        // AQAB = 0x01 0x00 0x01
        assert_eq!(from_base64("AQAB").unwrap(), BigUint::from(65537u32));
        assert!(matches!(
            from_base64("@@@"),
            Err(PipelineError::MalformedCredential(_))
        ));
    }
}
