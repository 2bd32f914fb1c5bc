//! Groth16 Prover Service
//!
//! Runs witness generation and proving for the email-domain circuit.
//! Supports a local snarkjs install, a remote prover over HTTP, and a
//! deterministic mock for development.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::circuit::domain::decoded_offset;
use crate::circuit::{decode_base64, CircuitInputs};
use crate::error::PipelineError;
use crate::types::{Groth16Proof, ProofOutput};

/// Default witness generator, pinned by content address
pub const DEFAULT_WASM_URL: &str =
    "https://ipfs.io/ipfs/bafybeifbrj6kkysc5h6ewsw7x7gaj7ie6k4ycv63ol6cen3acumlfp7odm/EmailJWT.wasm";
/// Default proving key, pinned by content address
pub const DEFAULT_ZKEY_URL: &str =
    "https://ipfs.io/ipfs/bafybeiabhrxz4p225vwunus5muzznwgjyof7wyv4wxgjgrailwngemz63i/EmailJWT_final.zkey";

/// Which proving backend to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Snarkjs,
    Remote,
    Mock,
}

/// Prover configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProverConfig {
    /// Development mode - generate mock proofs
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub backend: BackendKind,
    /// Witness generator (`.wasm`), URL or local path
    #[serde(default = "default_wasm")]
    pub wasm: String,
    /// Proving key (`.zkey`), URL or local path
    #[serde(default = "default_zkey")]
    pub zkey: String,
    /// Expected SHA-256 of the proving key, hex
    pub zkey_sha256: Option<String>,
    /// Where downloaded artifacts are cached
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_snarkjs_bin")]
    pub snarkjs_bin: String,
    /// Endpoint of a remote prover accepting `{ "input": ... }`
    pub remote_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_wasm() -> String {
    DEFAULT_WASM_URL.to_string()
}

fn default_zkey() -> String {
    DEFAULT_ZKEY_URL.to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_snarkjs_bin() -> String {
    "snarkjs".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(feature = "dev-mode"),
            backend: BackendKind::default(),
            wasm: default_wasm(),
            zkey: default_zkey(),
            zkey_sha256: None,
            artifact_dir: default_artifact_dir(),
            snarkjs_bin: default_snarkjs_bin(),
            remote_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProverConfig {
    /// Backend actually used, after applying dev mode
    pub fn effective_backend(&self) -> BackendKind {
        if self.dev_mode {
            BackendKind::Mock
        } else {
            self.backend
        }
    }

    pub fn artifacts(&self) -> CircuitArtifacts {
        CircuitArtifacts {
            wasm: self.wasm.clone(),
            zkey: self.zkey.clone(),
            zkey_sha256: self.zkey_sha256.clone(),
        }
    }
}

/// Locators of the circuit's proving artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitArtifacts {
    pub wasm: String,
    pub zkey: String,
    pub zkey_sha256: Option<String>,
}

/// An external Groth16 prover
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Witness generation plus proving in one call
    async fn full_prove(
        &self,
        inputs: &CircuitInputs,
        artifacts: &CircuitArtifacts,
    ) -> Result<ProofOutput, PipelineError>;
}

/// A proof together with how long it took
#[derive(Debug, Clone)]
pub struct ProvedReport {
    pub output: ProofOutput,
    pub generation_time_ms: u64,
}

/// Proof generation service
#[derive(Clone)]
pub struct ProverService {
    config: ProverConfig,
    backend: Arc<dyn ProvingBackend>,
}

impl ProverService {
    /// Create a new prover service with the backend selected by `config`
    pub fn new(config: ProverConfig) -> Result<Self, PipelineError> {
        let backend: Arc<dyn ProvingBackend> = match config.effective_backend() {
            BackendKind::Mock => Arc::new(MockProver),
            BackendKind::Snarkjs => Arc::new(SnarkjsProver::new(
                config.snarkjs_bin.clone(),
                config.artifact_dir.clone(),
            )),
            BackendKind::Remote => {
                let url = config.remote_url.clone().ok_or_else(|| PipelineError::ProverFailure {
                    message: "remote prover selected without a URL".to_string(),
                    diagnostics: "prover.remote_url unset".to_string(),
                })?;
                Arc::new(RemoteProver::new(url))
            }
        };
        Ok(Self { config, backend })
    }

    /// Use a caller-provided backend
    pub fn with_backend(config: ProverConfig, backend: Arc<dyn ProvingBackend>) -> Self {
        Self { config, backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_mock(&self) -> bool {
        self.config.effective_backend() == BackendKind::Mock
    }

    /// Generate a proof for `inputs`
    #[instrument(skip(self, inputs), fields(backend = self.backend.name()))]
    pub async fn prove(&self, inputs: &CircuitInputs) -> Result<ProvedReport, PipelineError> {
        let shape = inputs.shape();
        info!(
            message_len = shape.message_len,
            pubkey_limbs = shape.pubkey_limbs,
            signature_limbs = shape.signature_limbs,
            content_bound = shape.content_bound,
            "Starting proof generation"
        );

        let start = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let artifacts = self.config.artifacts();

        let result = tokio::time::timeout(timeout, self.backend.full_prove(inputs, &artifacts))
            .await
            .map_err(|_| PipelineError::ProverFailure {
                message: format!("prover timed out after {}s", self.config.timeout_secs),
                diagnostics: shape.to_string(),
            })
            .and_then(|r| r);

        let generation_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                check_output(&output, &shape.to_string())?;
                info!(
                    generation_time_ms,
                    public_signals = output.public_signals.len(),
                    "Proof generated successfully"
                );
                Ok(ProvedReport {
                    output,
                    generation_time_ms,
                })
            }
            Err(e) => {
                error!(error = %e, generation_time_ms, "Proof generation failed");
                Err(e)
            }
        }
    }
}

fn check_output(output: &ProofOutput, diagnostics: &str) -> Result<(), PipelineError> {
    let proof = &output.proof;
    if proof.pi_a.is_empty() || proof.pi_b.is_empty() || proof.pi_c.is_empty() {
        return Err(PipelineError::ProverFailure {
            message: "prover returned an empty proof".to_string(),
            diagnostics: diagnostics.to_string(),
        });
    }
    if output.public_signals.is_empty() {
        return Err(PipelineError::ProverFailure {
            message: "prover returned no public signals".to_string(),
            diagnostics: diagnostics.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// snarkjs CLI
// ============================================================================

/// Runs `snarkjs groth16 fullprove` in a scratch directory
pub struct SnarkjsProver {
    binary: String,
    artifact_dir: PathBuf,
    http: reqwest::Client,
}

impl SnarkjsProver {
    pub fn new(binary: String, artifact_dir: PathBuf) -> Self {
        Self {
            binary,
            artifact_dir,
            http: reqwest::Client::new(),
        }
    }

    /// Local path for `locator`, downloading and caching URLs.
    async fn resolve(&self, locator: &str) -> Result<PathBuf, PipelineError> {
        if !locator.starts_with("http://") && !locator.starts_with("https://") {
            return Ok(PathBuf::from(locator));
        }

        let file_name = locator
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("artifact");
        let path = self.artifact_dir.join(file_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        info!(%locator, path = %path.display(), "Downloading circuit artifact");
        let bytes = self
            .http
            .get(locator)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| artifact_error(locator, e))?
            .bytes()
            .await
            .map_err(|e| artifact_error(locator, e))?;

        let size = bytes.len();
        let dir = self.artifact_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || store_artifact(&dir, &target, &bytes))
            .await
            .map_err(|e| artifact_error(locator, e))?
            .map_err(|e| artifact_error(locator, e))?;
        info!(bytes = size, "Artifact cached");
        Ok(path)
    }
}

/// Write `bytes` to `path` through a temporary file in `dir`, so a cached
/// artifact is either complete or absent.
fn store_artifact(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn artifact_error(locator: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ProverFailure {
        message: format!("failed to load artifact {locator}: {e}"),
        diagnostics: String::new(),
    }
}

/// Compare the SHA-256 of the file at `path` against `expected` (hex).
pub async fn check_fingerprint(path: &Path, expected: &str) -> Result<(), PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| artifact_error(&path.display().to_string(), e))?;
    let actual = hex::encode(Sha256::digest(&bytes));
    let expected = expected.trim_start_matches("0x").to_ascii_lowercase();
    if actual != expected {
        return Err(PipelineError::ProverFailure {
            message: "proving key fingerprint mismatch".to_string(),
            diagnostics: format!("expected {expected}, found {actual}"),
        });
    }
    Ok(())
}

#[async_trait]
impl ProvingBackend for SnarkjsProver {
    fn name(&self) -> &'static str {
        "snarkjs"
    }

    async fn full_prove(
        &self,
        inputs: &CircuitInputs,
        artifacts: &CircuitArtifacts,
    ) -> Result<ProofOutput, PipelineError> {
        let wasm = self.resolve(&artifacts.wasm).await?;
        let zkey = self.resolve(&artifacts.zkey).await?;
        if let Some(expected) = &artifacts.zkey_sha256 {
            check_fingerprint(&zkey, expected).await?;
        }

        let scratch = tempfile::tempdir().map_err(|e| PipelineError::ProverFailure {
            message: format!("failed to create scratch dir: {e}"),
            diagnostics: String::new(),
        })?;
        let input_path = scratch.path().join("input.json");
        let proof_path = scratch.path().join("proof.json");
        let public_path = scratch.path().join("public.json");

        let input_json = serde_json::to_vec(inputs).map_err(|e| PipelineError::ProverFailure {
            message: format!("failed to serialize inputs: {e}"),
            diagnostics: inputs.shape().to_string(),
        })?;
        tokio::fs::write(&input_path, input_json)
            .await
            .map_err(|e| PipelineError::ProverFailure {
                message: format!("failed to write inputs: {e}"),
                diagnostics: String::new(),
            })?;

        debug!(binary = %self.binary, "Spawning snarkjs");
        let output = Command::new(&self.binary)
            .args(["groth16", "fullprove"])
            .arg(&input_path)
            .arg(&wasm)
            .arg(&zkey)
            .arg(&proof_path)
            .arg(&public_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::ProverFailure {
                message: format!("failed to run {}: {e}", self.binary),
                diagnostics: String::new(),
            })?;

        if !output.status.success() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "snarkjs stderr");
            return Err(PipelineError::ProverFailure {
                message: format!("snarkjs exited with {}", output.status),
                diagnostics: format!(
                    "{}, stderr {} bytes",
                    inputs.shape(),
                    output.stderr.len()
                ),
            });
        }

        let proof: Groth16Proof = read_json(&proof_path).await?;
        let public_signals: Vec<String> = read_json(&public_path).await?;
        Ok(ProofOutput {
            proof,
            public_signals,
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::ProverFailure {
            message: format!("missing prover output {}: {e}", path.display()),
            diagnostics: String::new(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::ProverFailure {
        message: format!("unreadable prover output {}: {e}", path.display()),
        diagnostics: format!("{} bytes", bytes.len()),
    })
}

// ============================================================================
// Remote prover
// ============================================================================

/// Public signals as returned by a remote prover: either the raw array or
/// named fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteSignals {
    Ordered(Vec<String>),
    Named {
        organization_hash: String,
        report_hash: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteResponse {
    proof: Option<Groth16Proof>,
    public_signals: Option<RemoteSignals>,
    error: Option<String>,
}

/// Delegates proving to an HTTP service
pub struct RemoteProver {
    url: String,
    http: reqwest::Client,
}

impl RemoteProver {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProvingBackend for RemoteProver {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn full_prove(
        &self,
        inputs: &CircuitInputs,
        _artifacts: &CircuitArtifacts,
    ) -> Result<ProofOutput, PipelineError> {
        let failure = |message: String| PipelineError::ProverFailure {
            message,
            diagnostics: inputs.shape().to_string(),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "input": inputs }))
            .send()
            .await
            .map_err(|e| failure(format!("remote prover unreachable: {e}")))?;
        let status = response.status();
        let body: RemoteResponse = response
            .json()
            .await
            .map_err(|e| failure(format!("remote prover returned invalid JSON ({status}): {e}")))?;

        if let Some(message) = body.error {
            return Err(failure(format!("remote prover error ({status}): {message}")));
        }
        let proof = body
            .proof
            .ok_or_else(|| failure("remote prover response has no proof".to_string()))?;
        let public_signals = match body.public_signals {
            Some(RemoteSignals::Ordered(signals)) => signals,
            Some(RemoteSignals::Named {
                organization_hash,
                report_hash,
            }) => vec![organization_hash, report_hash],
            None => Vec::new(),
        };

        Ok(ProofOutput {
            proof,
            public_signals,
        })
    }
}

// ============================================================================
// Mock prover (dev mode)
// ============================================================================

/// Deterministic stand-in for the real circuit.
///
/// Extracts the domain from the inputs the same way the circuit does and
/// commits to it with [`mock_organization_commitment`]. Points are derived
/// from a hash of the inputs; they do not verify.
pub struct MockProver;

/// Organization commitment used by [`MockProver`]: the first 31 bytes of
/// SHA-256 over the domain, so it always fits the scalar field.
pub fn mock_organization_commitment(domain: &str) -> BigUint {
    BigUint::from_bytes_be(&Sha256::digest(domain.as_bytes())[..31])
}

impl MockProver {
    /// Domain the circuit would extract from `inputs`.
    pub fn extract_domain(inputs: &CircuitInputs) -> Result<String, PipelineError> {
        let malformed = |what: &str| PipelineError::ProverFailure {
            message: format!("mock prover cannot read {what}"),
            diagnostics: inputs.shape().to_string(),
        };
        let parse = |value: &str, what: &str| value.parse::<usize>().map_err(|_| malformed(what));

        let period_index = parse(&inputs.period_index, "periodIndex")?;
        let index = parse(&inputs.email_domain_index, "emailDomainIndex")?;
        let length = parse(&inputs.email_domain_length, "emailDomainLength")?;

        let message: Vec<u8> = inputs
            .message
            .iter()
            .map(|b| b.parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| malformed("message"))?;
        // signed text is ASCII, so the first 0x80 is the padding marker
        let signed_len = message
            .iter()
            .position(|b| *b == 0x80)
            .ok_or_else(|| malformed("message padding"))?;
        let claims_start = period_index + 1;
        if index < claims_start || claims_start > signed_len {
            return Err(malformed("domain index"));
        }

        let claims = decode_base64(&String::from_utf8_lossy(&message[claims_start..signed_len]))
            .map_err(|_| malformed("claims segment"))?;
        let offset = decoded_offset(index - claims_start);
        let domain = claims
            .get(offset..offset + length)
            .ok_or_else(|| malformed("domain span"))?;
        Ok(String::from_utf8_lossy(domain).into_owned())
    }
}

#[async_trait]
impl ProvingBackend for MockProver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn full_prove(
        &self,
        inputs: &CircuitInputs,
        _artifacts: &CircuitArtifacts,
    ) -> Result<ProofOutput, PipelineError> {
        warn!("Generating mock proof (dev mode)");

        let domain = Self::extract_domain(inputs)?;
        let seed = Sha256::digest(serde_json::to_vec(inputs).unwrap_or_default());
        let coordinate = |label: u8| {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update([label]);
            BigUint::from_bytes_be(&hasher.finalize()[..31]).to_str_radix(10)
        };

        let proof = Groth16Proof {
            pi_a: vec![coordinate(0), coordinate(1), "1".to_string()],
            pi_b: vec![
                vec![coordinate(2), coordinate(3)],
                vec![coordinate(4), coordinate(5)],
                vec!["1".to_string(), "0".to_string()],
            ],
            pi_c: vec![coordinate(6), coordinate(7), "1".to_string()],
            protocol: "groth16".to_string(),
            curve: Some("bn128".to_string()),
        };

        Ok(ProofOutput {
            proof,
            public_signals: vec![
                mock_organization_commitment(&domain).to_str_radix(10),
                inputs.report_content_hash.clone(),
            ],
        })
    }
}
