//! Input compilation, proof generation and proof formatting endpoints

use axum::{extract::State, routing::post, Json, Router};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::ApiError;
use crate::calldata::to_call_arguments;
use crate::circuit::BuiltInputs;
use crate::error::PipelineError;
use crate::services::compile_credential;
use crate::state::AppState;
use crate::types::{
    BuildInputsResponse, CredentialRequest, FormatProofResponse, GenerateProofResponse,
    ProofRequest, VerifyProofResponse,
};

/// Create proof routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inputs", post(build_inputs))
        .route("/proof/generate", post(generate_proof))
        .route("/proof/format", post(format_proof))
        .route("/proof/verify", post(verify_proof))
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim)
}

/// Compile inputs with the state's key directory and builder
async fn compile(
    state: &AppState,
    credential: &str,
    title: Option<&str>,
    content: Option<&str>,
) -> Result<BuiltInputs, PipelineError> {
    compile_credential(state.builder(), state.keys().as_ref(), credential, title, content).await
}

/// Compile circuit inputs without proving
/// POST /api/v1/inputs
#[instrument(skip(state, request))]
async fn build_inputs(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<BuildInputsResponse>, ApiError> {
    let built = compile(
        &state,
        &request.credential,
        trimmed(&request.title),
        trimmed(&request.content),
    )
    .await?;

    let shape = built.inputs.shape();
    info!(%shape, "Inputs compiled");
    Ok(Json(BuildInputsResponse {
        shape: shape.into(),
        domain: built.domain.domain,
        inputs: built.inputs,
    }))
}

/// Generate a proof
/// POST /api/v1/proof/generate
#[instrument(skip(state, request))]
async fn generate_proof(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<GenerateProofResponse>, ApiError> {
    let _permit = state.try_acquire_proof_permit().ok_or_else(ApiError::busy)?;
    let request_id = Uuid::new_v4().to_string();
    info!(%request_id, "Received proof generation request");

    let built = compile(
        &state,
        &request.credential,
        trimmed(&request.title),
        trimmed(&request.content),
    )
    .await?;

    state.enqueue_proof(request_id.clone()).await;
    let result = state.prover().prove(&built.inputs).await;
    state.dequeue_proof(&request_id).await;

    let proved = result.map_err(|e| {
        error!(%request_id, error = %e, "Proof generation failed");
        e
    })?;
    state.increment_proofs();

    let organization_name = proved
        .output
        .public_signals
        .first()
        .map(|signal| state.directory().resolve_signal(signal).to_string())
        .unwrap_or_default();

    info!(
        %request_id,
        generation_time_ms = proved.generation_time_ms,
        "Proof generated successfully"
    );

    Ok(Json(GenerateProofResponse {
        request_id,
        proof: proved.output.proof,
        public_signals: proved.output.public_signals,
        organization_name,
        generation_time_ms: proved.generation_time_ms,
    }))
}

/// Convert a proof to verifier call arguments
/// POST /api/v1/proof/format
async fn format_proof(
    Json(request): Json<ProofRequest>,
) -> Result<Json<FormatProofResponse>, ApiError> {
    let args = to_call_arguments(&request.proof, &request.public_signals)?;
    Ok(Json(FormatProofResponse {
        call_arguments: args.to_view(),
    }))
}

/// Check a proof against the on-chain verifier
/// POST /api/v1/proof/verify
#[instrument(skip(state, request))]
async fn verify_proof(
    State(state): State<AppState>,
    Json(request): Json<ProofRequest>,
) -> Result<Json<VerifyProofResponse>, ApiError> {
    let chain = state.chain().ok_or_else(ApiError::chain_not_configured)?;
    let args = to_call_arguments(&request.proof, &request.public_signals)?;

    let response = match chain.verify_proof(&args).await {
        Ok(valid) => VerifyProofResponse {
            valid,
            error: (!valid).then(|| "Verifier rejected the proof".to_string()),
        },
        Err(e @ PipelineError::ChainRevert { .. }) => VerifyProofResponse {
            valid: false,
            error: Some(e.to_string()),
        },
        Err(e) => return Err(e.into()),
    };
    info!(valid = response.valid, "Proof verification finished");
    Ok(Json(response))
}
