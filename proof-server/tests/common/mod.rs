//! Shared fixtures: a throwaway RS256 issuer and an in-memory registry.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{TxHash, U256};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};
use serde_json::{json, Value};
use tower::ServiceExt;

use org_proof_server::calldata::CallArguments;
use org_proof_server::circuit::rs256::emsa_pkcs1_v15;
use org_proof_server::circuit::CircuitInputBuilder;
use org_proof_server::config::CircuitConfig;
use org_proof_server::error::PipelineError;
use org_proof_server::prover::mock_organization_commitment;
use org_proof_server::services::chain::OnChainReport;
use org_proof_server::services::{
    ChainClient, ConfirmationPolicy, OrganizationDirectory, ProverConfig, ProverService,
    StaticKeyDirectory,
};
use org_proof_server::state::{AppState, Services};
use org_proof_server::types::PublicKeyMaterial;

pub const EXPONENT: u64 = 65537;

fn mersenne(bits: usize) -> BigUint {
    (BigUint::one() << bits) - 1u32
}

fn mod_inverse(a: &BigUint, m: &BigUint) -> BigUint {
    let m = BigInt::from(m.clone());
    let (mut old_r, mut r) = (BigInt::from(a.clone()), m.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    assert!(old_r.is_one(), "not invertible");
    ((old_s % &m + &m) % &m).to_biguint().unwrap()
}

/// RS256 issuer over the Mersenne primes 2^127 - 1 and 2^521 - 1
pub struct TestIssuer {
    pub kid: String,
    modulus: BigUint,
    private_exponent: BigUint,
}

impl TestIssuer {
    pub fn new(kid: &str) -> Self {
        let p = mersenne(127);
        let q = mersenne(521);
        let phi = (&p - 1u32) * (&q - 1u32);
        Self {
            kid: kid.to_string(),
            private_exponent: mod_inverse(&BigUint::from(EXPONENT), &phi),
            modulus: p * q,
        }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn public_key(&self) -> PublicKeyMaterial {
        PublicKeyMaterial {
            modulus: URL_SAFE_NO_PAD.encode(self.modulus.to_bytes_be()),
            exponent: EXPONENT,
        }
    }

    /// Sign `claims` as a compact RS256 token.
    pub fn sign_claims(&self, claims: &Value) -> String {
        let header = json!({"alg": "RS256", "kid": self.kid, "typ": "JWT"});
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );

        let k = (self.modulus.bits() as usize).div_ceil(8);
        let em = emsa_pkcs1_v15(signing_input.as_bytes(), k).unwrap();
        let signature = BigUint::from_bytes_be(&em).modpow(&self.private_exponent, &self.modulus);
        let mut bytes = signature.to_bytes_be();
        let mut sig = vec![0u8; k - bytes.len()];
        sig.append(&mut bytes);

        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    pub fn credential(&self, email: &str) -> String {
        self.sign_claims(&json!({
            "iss": "https://accounts.google.com",
            "sub": "110169484474386276334",
            "email": email,
            "email_verified": true,
        }))
    }
}

/// Commitment the mock prover produces for `domain`
pub fn organization_commitment(domain: &str) -> U256 {
    U256::from_str_radix(&mock_organization_commitment(domain).to_str_radix(10), 10).unwrap()
}

/// Registry that mines every submission immediately and rejects reused
/// content commitments.
#[derive(Default)]
pub struct FakeRegistry {
    reports: Mutex<Vec<OnChainReport>>,
    used: Mutex<HashMap<U256, TxHash>>,
}

impl FakeRegistry {
    pub fn reports(&self) -> Vec<OnChainReport> {
        self.reports.lock().unwrap().clone()
    }
}

fn tx_hash_for(id: usize) -> TxHash {
    TxHash::with_last_byte(id as u8 + 1)
}

#[async_trait]
impl ChainClient for FakeRegistry {
    async fn submit_report(
        &self,
        title: &str,
        content: &str,
        args: &CallArguments,
    ) -> Result<TxHash, PipelineError> {
        let [organization_hash, content_hash] = args.pub_signals_array()?;
        let mut used = self.used.lock().unwrap();
        if used.contains_key(&content_hash) {
            return Err(PipelineError::ProofReuseConflict { tx_hash: None });
        }

        let mut reports = self.reports.lock().unwrap();
        let id = reports.len();
        reports.push(OnChainReport {
            id: U256::from(id),
            title: title.to_string(),
            content: content.to_string(),
            timestamp: U256::from(1_700_000_000u64 + id as u64),
            organization_hash,
        });
        used.insert(content_hash, tx_hash_for(id));
        Ok(tx_hash_for(id))
    }

    async fn find_report_submitted(&self, tx: TxHash) -> Result<Option<U256>, PipelineError> {
        let count = self.reports.lock().unwrap().len();
        Ok((0..count).find(|id| tx_hash_for(*id) == tx).map(U256::from))
    }

    async fn get_report(&self, id: U256) -> Result<OnChainReport, PipelineError> {
        let reports = self.reports.lock().unwrap();
        u64::try_from(id)
            .ok()
            .and_then(|i| reports.get(i as usize).cloned())
            .ok_or(PipelineError::ChainRevert {
                reason: Some("Report does not exist".to_string()),
            })
    }

    async fn report_count(&self) -> Result<U256, PipelineError> {
        Ok(U256::from(self.reports.lock().unwrap().len()))
    }

    async fn verify_proof(&self, args: &CallArguments) -> Result<bool, PipelineError> {
        Ok(args.pub_signals.len() == 2)
    }
}

/// Dev-mode state that trusts `issuer` and knows `acme.test` as Acme Corp.
pub fn test_state(issuer: &TestIssuer, chain: Option<Arc<FakeRegistry>>) -> AppState {
    let keys = StaticKeyDirectory::default().with_key(issuer.kid.clone(), issuer.public_key());
    let directory =
        OrganizationDirectory::from_entries([(organization_commitment("acme.test"), "Acme Corp")]);
    let prover = ProverService::new(ProverConfig {
        dev_mode: true,
        ..ProverConfig::default()
    })
    .unwrap();

    let services = Services {
        builder: CircuitInputBuilder::new(&CircuitConfig::default()),
        keys: Arc::new(keys),
        prover,
        chain: chain.map(|c| c as Arc<dyn ChainClient>),
        directory: Arc::new(directory),
        confirmation: ConfirmationPolicy {
            attempts: 1,
            interval_ms: 1,
        },
    };
    AppState::new(services, 2)
}

/// Send one request through the router and parse the JSON body.
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
