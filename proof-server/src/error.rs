//! Pipeline error taxonomy
//!
//! Structural errors are raised locally before any network call and are fatal
//! for the current attempt. Prover and chain errors carry diagnostics made of
//! field lengths, never field values.

use alloy::primitives::TxHash;
use thiserror::Error;

use crate::types::ErrorCode;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),
    #[error("Missing identity field `{field}` (absent, not a string, or not a single-@ address)")]
    MissingIdentityField { field: String },
    #[error("Field too long: {length} bytes exceeds the circuit maximum of {max}")]
    FieldTooLong { length: usize, max: usize },
    #[error("Value overflow: {bits}-bit value does not fit in {capacity} limb bits")]
    ValueOverflow { bits: u64, capacity: usize },
    #[error("Message too long: padded length {padded} exceeds circuit capacity {capacity}")]
    MessageTooLong { padded: usize, capacity: usize },
    #[error("Credential signature does not verify against key `{kid}`")]
    SignatureMismatch { kid: String },
    #[error("Signing key `{kid}` not found: {reason}")]
    KeyNotFound { kid: String, reason: String },
    #[error("Prover failure: {message} ({diagnostics})")]
    ProverFailure { message: String, diagnostics: String },
    #[error("Chain call reverted: {}", reason.as_deref().unwrap_or("no reason returned"))]
    ChainRevert { reason: Option<String> },
    #[error("Proof already used on chain")]
    ProofReuseConflict { tx_hash: Option<TxHash> },
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),
    #[error("No chain endpoint configured")]
    ChainNotConfigured,
    #[error("Cannot {stage} a submission in state {state}")]
    OutOfOrder { stage: &'static str, state: String },
}

impl PipelineError {
    /// True for errors detected from the inputs alone, before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedCredential(_)
                | PipelineError::MissingIdentityField { .. }
                | PipelineError::FieldTooLong { .. }
                | PipelineError::ValueOverflow { .. }
                | PipelineError::MessageTooLong { .. }
                | PipelineError::SignatureMismatch { .. }
        )
    }

    /// API error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::MalformedCredential(_) => ErrorCode::MalformedCredential,
            PipelineError::MissingIdentityField { .. } => ErrorCode::MissingIdentityField,
            PipelineError::FieldTooLong { .. } => ErrorCode::FieldTooLong,
            PipelineError::ValueOverflow { .. } => ErrorCode::ValueOverflow,
            PipelineError::MessageTooLong { .. } => ErrorCode::MessageTooLong,
            PipelineError::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            PipelineError::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            PipelineError::ProverFailure { .. } => ErrorCode::ProverFailure,
            PipelineError::ChainRevert { .. } => ErrorCode::ChainRevert,
            PipelineError::ProofReuseConflict { .. } => ErrorCode::ProofReuseConflict,
            PipelineError::ChainUnavailable(_) | PipelineError::ChainNotConfigured => {
                ErrorCode::ChainUnavailable
            }
            PipelineError::OutOfOrder { .. } => ErrorCode::InternalError,
        }
    }
}
