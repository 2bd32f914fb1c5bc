//! Circuit input assembly
//!
//! Produces the named-field JSON object the witness generator consumes.
//! Every integer is a decimal string; field names match the circuit's
//! signal names.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::binding::bind_optional;
use super::domain::{locate_domain, DomainLocation};
use super::limbs::{from_base64, to_decimal_strings, LimbLayout};
use super::padding::ShaPadding;
use super::rs256;
use super::token::{decode_credential, DecodedCredential};
use crate::config::CircuitConfig;
use crate::error::PipelineError;
use crate::types::PublicKeyMaterial;

/// Inputs for the email-domain circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInputs {
    /// Padded `header.claims` bytes, one decimal string per byte
    pub message: Vec<String>,
    /// Block-aligned length of the padded message
    pub message_length: String,
    /// RSA modulus limbs
    pub pubkey: Vec<String>,
    /// RSA signature limbs
    pub signature: Vec<String>,
    /// Offset of the `.` between header and claims
    pub period_index: String,
    pub email_domain_index: String,
    pub email_domain_length: String,
    /// Content commitment, `0` when unbound
    pub report_content_hash: String,
}

impl CircuitInputs {
    pub fn shape(&self) -> InputShape {
        InputShape {
            message_len: self.message.len(),
            pubkey_limbs: self.pubkey.len(),
            signature_limbs: self.signature.len(),
            content_bound: self.report_content_hash != "0",
        }
    }
}

/// Field lengths only, safe to log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputShape {
    pub message_len: usize,
    pub pubkey_limbs: usize,
    pub signature_limbs: usize,
    pub content_bound: bool,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message_len={} pubkey_limbs={} signature_limbs={} content_bound={}",
            self.message_len, self.pubkey_limbs, self.signature_limbs, self.content_bound
        )
    }
}

/// Result of a build, with the values downstream stages need
#[derive(Debug, Clone)]
pub struct BuiltInputs {
    pub inputs: CircuitInputs,
    pub domain: DomainLocation,
    pub content_commitment: BigUint,
}

/// Deterministic credential → circuit input compiler
#[derive(Debug, Clone)]
pub struct CircuitInputBuilder {
    limbs: LimbLayout,
    padding: ShaPadding,
    identity_field: String,
    max_domain_length: usize,
    rsa_exponent: u64,
    verify_signature: bool,
}

impl CircuitInputBuilder {
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            limbs: config.limb_layout(),
            padding: config.sha_padding(),
            identity_field: config.identity_field.clone(),
            max_domain_length: config.max_domain_length,
            rsa_exponent: config.rsa_exponent,
            verify_signature: config.verify_signature,
        }
    }

    pub fn limb_layout(&self) -> LimbLayout {
        self.limbs
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    /// Message capacity in bytes
    pub fn message_capacity(&self) -> usize {
        self.padding.max_len
    }

    /// Decode `credential` and build its inputs.
    pub fn build_str(
        &self,
        credential: &str,
        key: &PublicKeyMaterial,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<BuiltInputs, PipelineError> {
        let decoded = decode_credential(credential)?;
        self.build(&decoded, key, title, content)
    }

    #[instrument(skip_all, fields(kid = ?credential.header.kid))]
    pub fn build(
        &self,
        credential: &DecodedCredential,
        key: &PublicKeyMaterial,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<BuiltInputs, PipelineError> {
        if credential.header.alg != "RS256" {
            return Err(PipelineError::MalformedCredential(format!(
                "unsupported algorithm {}",
                credential.header.alg
            )));
        }

        let domain = locate_domain(credential, &self.identity_field, self.max_domain_length)?;

        let kid = credential.header.kid.clone().unwrap_or_default();
        if key.exponent != self.rsa_exponent {
            return Err(PipelineError::KeyNotFound {
                kid,
                reason: format!(
                    "exponent {} does not match the circuit exponent {}",
                    key.exponent, self.rsa_exponent
                ),
            });
        }
        let modulus = from_base64(&key.modulus).map_err(|_| PipelineError::KeyNotFound {
            kid: kid.clone(),
            reason: "modulus is not base64".to_string(),
        })?;
        let signature = from_base64(&credential.signature_segment)?;

        if self.verify_signature
            && !rs256::verify(
                credential.signed_message.as_bytes(),
                &signature,
                &modulus,
                key.exponent,
            )
        {
            return Err(PipelineError::SignatureMismatch { kid });
        }

        let padded = self.padding.pad(credential.signed_message.as_bytes())?;
        let pubkey = self.limbs.to_limbs(&modulus)?;
        let signature = self.limbs.to_limbs(&signature)?;
        let content_commitment = bind_optional(title, content);

        let inputs = CircuitInputs {
            message: padded.bytes.iter().map(|b| b.to_string()).collect(),
            message_length: padded.padded_len.to_string(),
            pubkey: to_decimal_strings(&pubkey),
            signature: to_decimal_strings(&signature),
            period_index: credential.period_index.to_string(),
            email_domain_index: domain.index.to_string(),
            email_domain_length: domain.length.to_string(),
            report_content_hash: content_commitment.to_str_radix(10),
        };

        debug!(
            signed_len = credential.signed_message.len(),
            padded_len = padded.padded_len,
            shape = %inputs.shape(),
            "Circuit inputs built"
        );

        Ok(BuiltInputs {
            inputs,
            domain,
            content_commitment,
        })
    }
}
