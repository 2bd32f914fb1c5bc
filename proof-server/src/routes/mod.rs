//! HTTP Routes for the Proof Server
//!
//! Provides REST API endpoints for input compilation, proving and report
//! submission.

pub mod health;
pub mod proof;
pub mod reports;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};

use crate::error::PipelineError;
use crate::state::AppState;
use crate::types::{ErrorCode, ErrorResponse};

/// Create all routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest(
            "/api/v1",
            Router::new().merge(proof::routes()).merge(reports::routes()),
        )
        .with_state(state)
}

/// Error body plus status, returned by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, message)
    }

    pub fn busy() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServerBusy,
            "All proving slots are in use, retry later",
        )
    }

    pub fn chain_not_configured() -> Self {
        PipelineError::ChainNotConfigured.into()
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::MalformedCredential(_) => StatusCode::BAD_REQUEST,
        e if e.is_local() => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::KeyNotFound { .. } => StatusCode::NOT_FOUND,
        PipelineError::ChainRevert { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::ProofReuseConflict { .. } => StatusCode::CONFLICT,
        PipelineError::ChainUnavailable(_) | PipelineError::ChainNotConfigured => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let mut api = Self::new(status_for(&error), error.code(), error.to_string());
        if let PipelineError::ProofReuseConflict { tx_hash: Some(tx) } = &error {
            api.body.details = Some(serde_json::json!({ "txHash": tx.to_string() }));
        }
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_error_class() {
        let cases = [
            (PipelineError::MalformedCredential("x".into()), StatusCode::BAD_REQUEST),
            (
                PipelineError::FieldTooLong { length: 300, max: 255 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::SignatureMismatch { kid: "k".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::ProofReuseConflict { tx_hash: None },
                StatusCode::CONFLICT,
            ),
            (PipelineError::ChainRevert { reason: None }, StatusCode::BAD_GATEWAY),
            (PipelineError::ChainNotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (
                PipelineError::ProverFailure {
                    message: "crashed".into(),
                    diagnostics: "message_len=2048".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn test_reuse_conflict_carries_tx_hash() {
        let tx = alloy::primitives::TxHash::repeat_byte(0xab);
        let api = ApiError::from(PipelineError::ProofReuseConflict { tx_hash: Some(tx) });
        assert_eq!(api.body.code, ErrorCode::ProofReuseConflict);
        assert_eq!(api.body.details.unwrap()["txHash"], tx.to_string());
    }
}
