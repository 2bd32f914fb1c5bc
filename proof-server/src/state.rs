//! Application State
//!
//! Shared state for the proof server, accessible from all route handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};
use tracing::{info, warn};

use crate::circuit::CircuitInputBuilder;
use crate::config::Config;
use crate::services::{
    ChainClient, ConfirmationPolicy, AlloyChainClient, JwksKeyDirectory, KeyDirectory,
    OrganizationDirectory, ProverService, ReportService, StaticKeyDirectory,
    SubmissionOrchestrator,
};

/// Everything the handlers call into
pub struct Services {
    pub builder: CircuitInputBuilder,
    pub keys: Arc<dyn KeyDirectory>,
    pub prover: ProverService,
    /// `None` when no RPC endpoint is configured
    pub chain: Option<Arc<dyn ChainClient>>,
    pub directory: Arc<OrganizationDirectory>,
    pub confirmation: ConfirmationPolicy,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    services: Services,
    /// Bounds concurrent proving runs
    proof_permits: Semaphore,
    /// Proof request queue (for rate limiting)
    proof_queue: RwLock<Vec<String>>,
    /// Total proofs generated
    total_proofs: AtomicU64,
    /// Total reports submitted
    total_reports: AtomicU64,
    /// Server start time
    start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(services: Services, max_concurrent_proofs: usize) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                services,
                proof_permits: Semaphore::new(max_concurrent_proofs),
                proof_queue: RwLock::new(Vec::new()),
                total_proofs: AtomicU64::new(0),
                total_reports: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    /// Wire up services from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let builder = CircuitInputBuilder::new(&config.circuit);

        let keys: Arc<dyn KeyDirectory> = if config.keys.static_keys.is_empty() {
            info!(url = %config.keys.jwks_url, "Using JWKS key directory");
            Arc::new(JwksKeyDirectory::new(config.keys.jwks_url.clone()))
        } else {
            info!(keys = config.keys.static_keys.len(), "Using static key directory");
            Arc::new(StaticKeyDirectory::new(config.keys.static_keys.clone()))
        };

        let prover = ProverService::new(config.prover.clone())
            .context("failed to initialize prover")?;

        let chain: Option<Arc<dyn ChainClient>> = if config.chain.is_configured() {
            let client = AlloyChainClient::new(&config.chain)
                .context("failed to initialize chain client")?;
            Some(Arc::new(client))
        } else {
            warn!("No chain endpoint configured, report submission and listing disabled");
            None
        };

        let directory = match &config.organization_directory {
            Some(path) => OrganizationDirectory::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => OrganizationDirectory::default(),
        };

        let services = Services {
            builder,
            keys,
            prover,
            chain,
            directory: Arc::new(directory),
            confirmation: config.confirmation,
        };
        Ok(Self::new(services, config.server.max_concurrent_proofs))
    }

    pub fn builder(&self) -> &CircuitInputBuilder {
        &self.inner.services.builder
    }

    pub fn keys(&self) -> &Arc<dyn KeyDirectory> {
        &self.inner.services.keys
    }

    /// Get the prover service
    pub fn prover(&self) -> &ProverService {
        &self.inner.services.prover
    }

    pub fn chain(&self) -> Option<&Arc<dyn ChainClient>> {
        self.inner.services.chain.as_ref()
    }

    pub fn directory(&self) -> &OrganizationDirectory {
        &self.inner.services.directory
    }

    /// Submission pipeline, when a chain is configured
    pub fn orchestrator(&self) -> Option<SubmissionOrchestrator> {
        let services = &self.inner.services;
        let chain = services.chain.clone()?;
        Some(SubmissionOrchestrator::new(
            services.builder.clone(),
            services.keys.clone(),
            services.prover.clone(),
            chain,
            services.confirmation,
        ))
    }

    /// Report reader, when a chain is configured
    pub fn reports(&self) -> Option<ReportService> {
        let services = &self.inner.services;
        let chain = services.chain.clone()?;
        Some(ReportService::new(chain, services.directory.clone()))
    }

    /// Take a proving permit without waiting; `None` when all are in use.
    pub fn try_acquire_proof_permit(&self) -> Option<SemaphorePermit<'_>> {
        self.inner.proof_permits.try_acquire().ok()
    }

    /// Get current proof queue length
    pub async fn proof_queue_length(&self) -> usize {
        self.inner.proof_queue.read().await.len()
    }

    /// Add a proof request to the queue
    pub async fn enqueue_proof(&self, id: String) {
        self.inner.proof_queue.write().await.push(id);
    }

    /// Remove a proof request from the queue
    pub async fn dequeue_proof(&self, id: &str) {
        let mut queue = self.inner.proof_queue.write().await;
        queue.retain(|x| x != id);
    }

    /// Get total proofs generated
    pub fn total_proofs_generated(&self) -> u64 {
        self.inner.total_proofs.load(Ordering::Relaxed)
    }

    /// Increment proof counter
    pub fn increment_proofs(&self) {
        self.inner.total_proofs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_reports_submitted(&self) -> u64 {
        self.inner.total_reports.load(Ordering::Relaxed)
    }

    pub fn increment_reports(&self) {
        self.inner.total_reports.fetch_add(1, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
