//! Reading reports back from the registry

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use chrono::DateTime;
use tracing::{info, instrument, warn};

use super::chain::{ChainClient, OnChainReport};
use super::directory::{commitment_key, OrganizationDirectory};
use crate::error::PipelineError;
use crate::types::ReportView;

/// `reportCount` read attempts
pub const COUNT_ATTEMPTS: u32 = 3;
/// Pause between `reportCount` attempts
pub const COUNT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Most reports read for one listing
pub const MAX_PAGE_SIZE: u64 = 100;

/// One page of the registry
#[derive(Debug, Clone)]
pub struct ReportPage {
    /// `reportCount` at the time of reading
    pub total: u64,
    pub offset: u64,
    pub reports: Vec<ReportView>,
}

pub struct ReportService {
    chain: Arc<dyn ChainClient>,
    directory: Arc<OrganizationDirectory>,
    count_interval: Duration,
}

impl ReportService {
    pub fn new(chain: Arc<dyn ChainClient>, directory: Arc<OrganizationDirectory>) -> Self {
        Self {
            chain,
            directory,
            count_interval: COUNT_RETRY_INTERVAL,
        }
    }

    /// Override the pause between count attempts
    pub fn with_count_interval(mut self, interval: Duration) -> Self {
        self.count_interval = interval;
        self
    }

    /// `reportCount`, retried on transient failures.
    async fn report_count(&self) -> Result<U256, PipelineError> {
        let mut attempt = 1;
        loop {
            match self.chain.report_count().await {
                Ok(count) => return Ok(count),
                Err(PipelineError::ChainNotConfigured) => return Err(PipelineError::ChainNotConfigured),
                Err(e) if attempt < COUNT_ATTEMPTS => {
                    warn!(attempt, error = %e, "reportCount failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.count_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Up to `limit` reports starting at id `offset`, oldest first. The
    /// limit is capped at [`MAX_PAGE_SIZE`].
    #[instrument(skip(self))]
    pub async fn list_reports(&self, offset: u64, limit: u64) -> Result<ReportPage, PipelineError> {
        let count = self.report_count().await?;
        let total: u64 = count
            .try_into()
            .map_err(|_| PipelineError::ChainUnavailable("report count out of range".to_string()))?;
        let end = offset.saturating_add(limit.min(MAX_PAGE_SIZE)).min(total);
        info!(total, offset, end, "Loading reports");

        let mut reports = Vec::new();
        for id in offset..end {
            let report = self.chain.get_report(U256::from(id)).await?;
            reports.push(self.to_view(report));
        }
        Ok(ReportPage {
            total,
            offset,
            reports,
        })
    }

    pub async fn get_report(&self, id: U256) -> Result<ReportView, PipelineError> {
        let report = self.chain.get_report(id).await?;
        Ok(self.to_view(report))
    }

    pub fn to_view(&self, report: OnChainReport) -> ReportView {
        let timestamp: u64 = report.timestamp.try_into().unwrap_or(u64::MAX);
        ReportView {
            id: report.id.to_string(),
            organization_name: self.directory.resolve(&report.organization_hash).to_string(),
            organization_hash: commitment_key(&report.organization_hash),
            title: report.title,
            content: report.content,
            timestamp,
            submitted_at: i64::try_from(timestamp)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}
