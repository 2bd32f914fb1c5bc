//! Report submission and listing endpoints

use std::str::FromStr;

use alloy::primitives::{TxHash, U256};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::ApiError;
use crate::services::reports::MAX_PAGE_SIZE;
use crate::services::{SubmissionOutcome, SubmissionSession};
use crate::state::AppState;
use crate::types::{
    ListReportsQuery, ReportListResponse, ReportView, SubmissionStatus, SubmitReportRequest,
    SubmitReportResponse,
};

/// Create report routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(submit_report))
        .route("/reports/:id", get(get_report))
}

/// Prove and submit a report end to end
/// POST /api/v1/reports
#[instrument(skip(state, request))]
async fn submit_report(
    State(state): State<AppState>,
    Json(request): Json<SubmitReportRequest>,
) -> Result<Json<SubmitReportResponse>, ApiError> {
    let title = request.title.trim();
    let content = request.content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(ApiError::invalid_input("title and content must not be empty"));
    }

    let prior_tx = request
        .tx_hash
        .as_deref()
        .map(|hash| {
            TxHash::from_str(hash.trim())
                .map_err(|_| ApiError::invalid_input(format!("invalid transaction hash `{hash}`")))
        })
        .transpose()?;

    let orchestrator = state.orchestrator().ok_or_else(ApiError::chain_not_configured)?;
    let _permit = state.try_acquire_proof_permit().ok_or_else(ApiError::busy)?;

    let mut session = SubmissionSession::new(title, content);
    if let Some(tx_hash) = prior_tx {
        info!(%tx_hash, "Retrying submission with an earlier transaction");
        session = session.with_prior_transaction(tx_hash);
    }
    let outcome = orchestrator.resume(&mut session, &request.credential).await?;
    state.increment_proofs();
    state.increment_reports();

    let organization_name = session
        .call_arguments()
        .and_then(|args| args.organization_commitment())
        .map(|commitment| state.directory().resolve(&commitment).to_string())
        .unwrap_or_default();

    let (status, report_id) = match outcome {
        SubmissionOutcome::Confirmed { report_id, .. } => {
            (SubmissionStatus::Confirmed, Some(report_id.to_string()))
        }
        SubmissionOutcome::SubmittedUnconfirmed { .. } => {
            (SubmissionStatus::SubmittedUnconfirmed, None)
        }
    };
    info!(tx_hash = %outcome.tx_hash(), ?status, "Report submission finished");

    Ok(Json(SubmitReportResponse {
        status,
        tx_hash: outcome.tx_hash().to_string(),
        report_id,
        organization_name,
    }))
}

/// GET /api/v1/reports?offset=&limit=
async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<ReportListResponse>, ApiError> {
    let service = state.reports().ok_or_else(ApiError::chain_not_configured)?;
    let page = service
        .list_reports(
            query.offset.unwrap_or(0),
            query.limit.unwrap_or(MAX_PAGE_SIZE),
        )
        .await?;
    Ok(Json(ReportListResponse {
        total: page.total,
        offset: page.offset,
        reports: page.reports,
    }))
}

/// GET /api/v1/reports/:id
async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportView>, ApiError> {
    let id = U256::from_str_radix(&id, 10)
        .map_err(|_| ApiError::invalid_input(format!("invalid report id `{id}`")))?;
    let service = state.reports().ok_or_else(ApiError::chain_not_configured)?;
    Ok(Json(service.get_report(id).await?))
}
