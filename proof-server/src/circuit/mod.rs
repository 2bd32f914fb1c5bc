//! Credential-to-circuit input compiler
//!
//! Pure, deterministic transformations from a signed credential and report
//! content into the byte and limb layout the email-domain circuit expects.
//! Nothing in this module performs I/O.

pub mod binding;
pub mod domain;
pub mod inputs;
pub mod limbs;
pub mod padding;
pub mod rs256;
pub mod token;

use alloy::primitives::{uint, U256};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

pub use binding::{bind, bind_optional};
pub use domain::{locate_domain, DomainLocation};
pub use inputs::{BuiltInputs, CircuitInputBuilder, CircuitInputs, InputShape};
pub use limbs::LimbLayout;
pub use padding::{PaddedMessage, ShaPadding};
pub use token::{decode_credential, DecodedCredential};

/// Order of the BN254 scalar field. Every public signal lies below it.
pub const SNARK_SCALAR_FIELD: U256 =
    uint!(21888242871839275222246405745257275088548364400416034343698204186575808495617_U256);

/// Standard alphabet, padding optional, lenient trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64 in either the standard or the URL-safe alphabet, with or
/// without `=` padding.
pub(crate) fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = input
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    LENIENT.decode(normalized)
}
