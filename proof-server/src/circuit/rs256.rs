//! RS256 signature check (RSASSA-PKCS1-v1_5 with SHA-256)
//!
//! The circuit proves exactly this relation. Checking it before proving turns
//! a wrong key or a tampered token into an immediate error instead of an
//! unsatisfiable witness after a long proving run.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// DER prefix of `DigestInfo` for SHA-256
pub const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// EMSA-PKCS1-v1_5 encoding of `message` for a `k`-byte modulus.
///
/// Returns `None` when the modulus is too short to hold the encoding.
pub fn emsa_pkcs1_v15(message: &[u8], k: usize) -> Option<Vec<u8>> {
    let digest = Sha256::digest(message);
    let t_len = SHA256_DIGEST_INFO.len() + digest.len();
    if k < t_len + 11 {
        return None;
    }

    let mut em = Vec::with_capacity(k);
    em.extend_from_slice(&[0x00, 0x01]);
    em.resize(k - t_len - 1, 0xff);
    em.push(0x00);
    em.extend_from_slice(&SHA256_DIGEST_INFO);
    em.extend_from_slice(&digest);
    Some(em)
}

/// Verify `signature` over `message` under the public key `(modulus, exponent)`.
pub fn verify(message: &[u8], signature: &BigUint, modulus: &BigUint, exponent: u64) -> bool {
    if signature >= modulus {
        return false;
    }
    let k = modulus.bits().div_ceil(8) as usize;
    let Some(expected) = emsa_pkcs1_v15(message, k) else {
        return false;
    };

    let recovered = signature.modpow(&BigUint::from(exponent), modulus);
    let mut em = recovered.to_bytes_be();
    if em.len() > k {
        return false;
    }
    // restore leading zero bytes dropped by to_bytes_be
    let mut padded = vec![0u8; k - em.len()];
    padded.append(&mut em);
    padded == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_layout() {
        let em = emsa_pkcs1_v15(b"abc", 64).unwrap();
        assert_eq!(em.len(), 64);
        assert_eq!(&em[..2], &[0x00, 0x01]);
        assert!(em[2..11].iter().all(|b| *b == 0xff));
        assert_eq!(em[64 - 52], 0x00);
        assert_eq!(&em[64 - 51..64 - 32], &SHA256_DIGEST_INFO);
        assert_eq!(&em[64 - 32..], Sha256::digest(b"abc").as_slice());
    }

    #[test]
    fn test_modulus_too_short() {
        assert!(emsa_pkcs1_v15(b"abc", 61).is_none());
        assert!(emsa_pkcs1_v15(b"abc", 62).is_some());
    }

    #[test]
    fn test_signature_at_or_above_modulus_rejected() {
        let modulus = BigUint::from(3233u32);
        assert!(!verify(b"m", &modulus, &modulus, 17));
    }
}
