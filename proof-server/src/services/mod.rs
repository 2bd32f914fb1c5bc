//! Services for the Proof Server
//!
//! Proving, key lookup, chain access and the submission pipeline that ties
//! them together.

pub mod chain;
pub mod directory;
pub mod keys;
pub mod orchestrator;
pub mod prover;
pub mod reports;

pub use chain::{ChainClient, ChainConfig, AlloyChainClient};
pub use directory::OrganizationDirectory;
pub use keys::{JwksKeyDirectory, KeyDirectory, KeysConfig, StaticKeyDirectory};
pub use orchestrator::{
    compile_credential, ConfirmationPolicy, SubmissionOrchestrator, SubmissionOutcome, SubmissionSession,
    SubmissionState,
};
pub use prover::{ProverConfig, ProverService, ProvingBackend};
pub use reports::{ReportPage, ReportService};
