//! Type definitions for the Proof Server
//!
//! Request/response types, proof types, and error codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitInputs, InputShape, LimbLayout};

/// Error codes returned by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedCredential,
    MissingIdentityField,
    FieldTooLong,
    ValueOverflow,
    MessageTooLong,
    /// Credential signature does not verify against the fetched key
    SignatureMismatch,
    KeyNotFound,
    ProverFailure,
    /// Verifier or registry rejected the call
    ChainRevert,
    ProofReuseConflict,
    ChainUnavailable,
    /// Request body failed validation
    InvalidInput,
    /// Server busy (all proving permits taken)
    ServerBusy,
    InternalError,
}

/// RSA public key of the credential issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyMaterial {
    /// Big-endian modulus, base64 (standard or URL-safe)
    pub modulus: String,
    pub exponent: u64,
}

/// Groth16 proof as emitted by snarkjs
///
/// Points are projective decimal strings; `pi_b` coordinates are Fp2 pairs
/// in `[c0, c1]` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

fn default_protocol() -> String {
    "groth16".to_string()
}

/// Output of a proving run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOutput {
    pub proof: Groth16Proof,
    /// `[organization commitment, content commitment]`
    pub public_signals: Vec<String>,
}

/// Verifier call arguments, rendered as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArgumentsView {
    pub p_a: [String; 2],
    pub p_b: [[String; 2]; 2],
    pub p_c: [String; 2],
    pub pub_signals: Vec<String>,
}

/// A report read back from the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Block timestamp, seconds
    pub timestamp: u64,
    /// `timestamp` as UTC
    pub submitted_at: Option<DateTime<Utc>>,
    /// 0x-prefixed 32-byte hex commitment
    pub organization_hash: String,
    pub organization_name: String,
}

// ==================== Request Types ====================

/// Credential plus optional report content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Signed identity token (`header.claims.signature`)
    pub credential: String,
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Proof plus its public signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequest {
    pub proof: Groth16Proof,
    #[serde(alias = "publicSignals")]
    pub public_signals: Vec<String>,
}

/// End-to-end report submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReportRequest {
    pub credential: String,
    pub title: String,
    pub content: String,
    /// Transaction an earlier attempt for the same report already sent
    #[serde(default, alias = "txHash")]
    pub tx_hash: Option<String>,
}

/// Paging for report listing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListReportsQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

// ==================== Response Types ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInputsResponse {
    pub inputs: CircuitInputs,
    pub shape: InputShapeView,
    /// Domain the circuit will extract
    pub domain: String,
}

/// Serializable mirror of [`InputShape`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputShapeView {
    pub message_len: usize,
    pub pubkey_limbs: usize,
    pub signature_limbs: usize,
    pub content_bound: bool,
}

impl From<InputShape> for InputShapeView {
    fn from(shape: InputShape) -> Self {
        Self {
            message_len: shape.message_len,
            pubkey_limbs: shape.pubkey_limbs,
            signature_limbs: shape.signature_limbs,
            content_bound: shape.content_bound,
        }
    }
}

/// Response from proof generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateProofResponse {
    /// Unique proof request ID
    pub request_id: String,
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
    /// Name resolved from the organization commitment, if known
    pub organization_name: String,
    pub generation_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatProofResponse {
    pub call_arguments: CallArgumentsView,
}

/// Response from proof verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyProofResponse {
    /// Whether the on-chain verifier accepted the proof
    pub valid: bool,
    /// Error message if invalid
    pub error: Option<String>,
}

/// Terminal state of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Confirmed,
    SubmittedUnconfirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReportResponse {
    pub status: SubmissionStatus,
    pub tx_hash: String,
    /// Present once the `ReportSubmitted` event was observed
    pub report_id: Option<String>,
    pub organization_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportListResponse {
    /// Reports in the registry
    pub total: u64,
    pub offset: u64,
    pub reports: Vec<ReportView>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional additional details
    pub details: Option<serde_json::Value>,
}

/// Server health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Proof requests currently in flight
    pub queue_length: usize,
    /// Estimated wait time in seconds
    pub estimated_wait_secs: u64,
    pub dev_mode: bool,
    pub chain_configured: bool,
}

/// Server status with more details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    /// Active proving backend
    pub prover_backend: String,
    pub limb_layout: LimbLayout,
    pub max_message_length: usize,
    pub total_proofs: u64,
    pub total_reports: u64,
    pub uptime_secs: u64,
}
