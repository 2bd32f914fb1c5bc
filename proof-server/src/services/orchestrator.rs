//! Report submission pipeline
//!
//! `Idle → InputsBuilt → Proved → Submitted → Confirmed`, with `Failed`
//! reachable from every stage. A session remembers the transaction hash of
//! its last write, so a retry that the registry rejects as a reused proof
//! can still be confirmed against the earlier transaction.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::chain::ChainClient;
use super::keys::KeyDirectory;
use super::prover::ProverService;
use crate::calldata::{to_call_arguments, CallArguments};
use crate::circuit::{decode_credential, BuiltInputs, CircuitInputBuilder};
use crate::error::PipelineError;
use crate::types::ProofOutput;

/// How long to wait for the `ReportSubmitted` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConfirmationPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_attempts() -> u32 {
    5
}

fn default_interval_ms() -> u64 {
    3000
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ConfirmationPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    InputsBuilt,
    Proved,
    Submitted,
    Confirmed,
    Failed,
}

/// Terminal result of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Confirmed { report_id: U256, tx_hash: TxHash },
    /// Written, but the event did not show up within the polling budget
    SubmittedUnconfirmed { tx_hash: TxHash },
}

impl SubmissionOutcome {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            SubmissionOutcome::Confirmed { tx_hash, .. }
            | SubmissionOutcome::SubmittedUnconfirmed { tx_hash } => *tx_hash,
        }
    }
}

/// One report's journey through the pipeline
#[derive(Debug, Clone)]
pub struct SubmissionSession {
    state: SubmissionState,
    title: String,
    content: String,
    inputs: Option<BuiltInputs>,
    proof: Option<ProofOutput>,
    call_arguments: Option<CallArguments>,
    tx_hash: Option<TxHash>,
}

impl SubmissionSession {
    /// Start a session for exactly these strings; they are bound and
    /// submitted unchanged.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            state: SubmissionState::Idle,
            title: title.into(),
            content: content.into(),
            inputs: None,
            proof: None,
            call_arguments: None,
            tx_hash: None,
        }
    }

    /// Seed the hash of a transaction an earlier attempt already sent, so a
    /// reuse rejection confirms that transaction instead of failing.
    pub fn with_prior_transaction(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn inputs(&self) -> Option<&BuiltInputs> {
        self.inputs.as_ref()
    }

    pub fn proof(&self) -> Option<&ProofOutput> {
        self.proof.as_ref()
    }

    pub fn call_arguments(&self) -> Option<&CallArguments> {
        self.call_arguments.as_ref()
    }

    /// Hash of the last transaction sent for this session
    pub fn tx_hash(&self) -> Option<TxHash> {
        self.tx_hash
    }

    /// Rewind a failed session to `InputsBuilt`, keeping the built inputs
    /// and any known transaction hash.
    pub fn rewind(&mut self) -> bool {
        if self.inputs.is_none() {
            return false;
        }
        self.state = SubmissionState::InputsBuilt;
        self.proof = None;
        self.call_arguments = None;
        true
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        warn!(from = ?self.state, error = %error, "Submission failed");
        self.state = SubmissionState::Failed;
        error
    }
}

/// Drives a session from credential to confirmed report
pub struct SubmissionOrchestrator {
    builder: CircuitInputBuilder,
    keys: Arc<dyn KeyDirectory>,
    prover: ProverService,
    chain: Arc<dyn ChainClient>,
    confirmation: ConfirmationPolicy,
}

impl SubmissionOrchestrator {
    pub fn new(
        builder: CircuitInputBuilder,
        keys: Arc<dyn KeyDirectory>,
        prover: ProverService,
        chain: Arc<dyn ChainClient>,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            builder,
            keys,
            prover,
            chain,
            confirmation,
        }
    }

    /// `Idle → InputsBuilt`
    #[instrument(skip_all)]
    pub async fn build_inputs(
        &self,
        session: &mut SubmissionSession,
        credential: &str,
    ) -> Result<(), PipelineError> {
        let compiled = compile_credential(
            &self.builder,
            self.keys.as_ref(),
            credential,
            Some(&session.title),
            Some(&session.content),
        )
        .await;
        let built = compiled.map_err(|e| session.fail(e))?;

        info!(domain_length = built.domain.length, "Inputs built");
        session.inputs = Some(built);
        session.state = SubmissionState::InputsBuilt;
        Ok(())
    }

    /// `InputsBuilt → Proved`; also formats the call arguments.
    #[instrument(skip_all)]
    pub async fn prove(&self, session: &mut SubmissionSession) -> Result<(), PipelineError> {
        let inputs = match (&session.state, &session.inputs) {
            (SubmissionState::InputsBuilt, Some(built)) => &built.inputs,
            _ => return Err(out_of_order(session.state, "prove")),
        };
        let proved = self.prover.prove(inputs).await.map_err(|e| session.fail(e))?;
        let args = to_call_arguments(&proved.output.proof, &proved.output.public_signals)
            .map_err(|e| session.fail(e))?;

        session.proof = Some(proved.output);
        session.call_arguments = Some(args);
        session.state = SubmissionState::Proved;
        Ok(())
    }

    /// `Proved → Submitted → Confirmed`
    #[instrument(skip_all)]
    pub async fn submit(
        &self,
        session: &mut SubmissionSession,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let args = match (&session.state, &session.call_arguments) {
            (SubmissionState::Proved, Some(args)) => args,
            _ => return Err(out_of_order(session.state, "submit")),
        };

        let tx_hash = match self
            .chain
            .submit_report(&session.title, &session.content, args)
            .await
        {
            Ok(tx_hash) => {
                info!(%tx_hash, "Report transaction sent");
                tx_hash
            }
            Err(PipelineError::ProofReuseConflict { tx_hash }) => {
                match tx_hash.or(session.tx_hash) {
                    Some(known) => {
                        warn!(tx_hash = %known, "Proof already used, confirming earlier transaction");
                        known
                    }
                    None => {
                        return Err(session.fail(PipelineError::ProofReuseConflict { tx_hash: None }))
                    }
                }
            }
            Err(e) => return Err(session.fail(e)),
        };

        session.tx_hash = Some(tx_hash);
        session.state = SubmissionState::Submitted;

        let outcome = self.confirm(tx_hash).await.map_err(|e| session.fail(e))?;
        if let SubmissionOutcome::Confirmed { report_id, .. } = outcome {
            info!(%report_id, %tx_hash, "Report confirmed");
            session.state = SubmissionState::Confirmed;
        }
        Ok(outcome)
    }

    /// Poll for the `ReportSubmitted` event of `tx_hash`.
    async fn confirm(&self, tx_hash: TxHash) -> Result<SubmissionOutcome, PipelineError> {
        for attempt in 1..=self.confirmation.attempts {
            if let Some(report_id) = self.chain.find_report_submitted(tx_hash).await? {
                return Ok(SubmissionOutcome::Confirmed { report_id, tx_hash });
            }
            if attempt < self.confirmation.attempts {
                tokio::time::sleep(self.confirmation.interval()).await;
            }
        }
        warn!(%tx_hash, attempts = self.confirmation.attempts, "Report not yet visible");
        Ok(SubmissionOutcome::SubmittedUnconfirmed { tx_hash })
    }

    /// Run the remaining stages of `session`.
    pub async fn resume(
        &self,
        session: &mut SubmissionSession,
        credential: &str,
    ) -> Result<SubmissionOutcome, PipelineError> {
        if session.state == SubmissionState::Failed && !session.rewind() {
            session.state = SubmissionState::Idle;
        }
        if session.state == SubmissionState::Idle {
            self.build_inputs(session, credential).await?;
        }
        if session.state == SubmissionState::InputsBuilt {
            self.prove(session).await?;
        }
        self.submit(session).await
    }

    /// Full pipeline for a fresh session
    pub async fn run(
        &self,
        credential: &str,
        title: &str,
        content: &str,
    ) -> Result<(SubmissionOutcome, SubmissionSession), PipelineError> {
        let mut session = SubmissionSession::new(title, content);
        let outcome = self.resume(&mut session, credential).await?;
        Ok((outcome, session))
    }
}

/// Decode `credential`, fetch the key named by its `kid` and compile circuit
/// inputs bound to `title` and `content`.
pub async fn compile_credential(
    builder: &CircuitInputBuilder,
    keys: &dyn KeyDirectory,
    credential: &str,
    title: Option<&str>,
    content: Option<&str>,
) -> Result<BuiltInputs, PipelineError> {
    let decoded = decode_credential(credential)?;
    let kid = decoded
        .header
        .kid
        .as_deref()
        .ok_or_else(|| PipelineError::KeyNotFound {
            kid: String::new(),
            reason: "credential header carries no kid".to_string(),
        })?;
    let key = keys.fetch(kid).await?;
    builder.build(&decoded, &key, title, content)
}

fn out_of_order(state: SubmissionState, stage: &'static str) -> PipelineError {
    PipelineError::OutOfOrder {
        stage,
        state: format!("{state:?}"),
    }
}
