//! Report content commitment
//!
//! The registry contract recomputes
//! `uint256(keccak256(bytes(title + "|" + content))) % SNARK_SCALAR_FIELD`
//! from the submitted strings and compares it with the proof's content
//! signal, so the preimage here must be the exact same bytes: no trimming,
//! no normalization. The reduction keeps the signal inside the scalar field;
//! an unreduced digest would be rejected by the verifier or silently wrapped
//! by the prover.

use alloy::primitives::U256;
use num_bigint::BigUint;
use num_traits::Zero;
use sha3::{Digest, Keccak256};

use super::SNARK_SCALAR_FIELD;

/// Separator between title and content in the commitment preimage
pub const CONTENT_SEPARATOR: &str = "|";

/// Keccak-256 of `title|content`, big-endian, reduced modulo the BN254
/// scalar field order.
pub fn bind(title: &str, content: &str) -> BigUint {
    let mut hasher = Keccak256::new();
    hasher.update(title.as_bytes());
    hasher.update(CONTENT_SEPARATOR.as_bytes());
    hasher.update(content.as_bytes());
    let reduced = U256::from_be_slice(&hasher.finalize()) % SNARK_SCALAR_FIELD;
    BigUint::from_bytes_be(&reduced.to_be_bytes::<32>())
}

/// Commitment for optional content; `0` marks a proof bound to no report.
pub fn bind_optional(title: Option<&str>, content: Option<&str>) -> BigUint {
    match content {
        Some(content) => bind(title.unwrap_or_default(), content),
        None => BigUint::zero(),
    }
}
