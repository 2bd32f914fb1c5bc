//! Issuer signing keys
//!
//! Keys are fetched fresh for every credential; nothing is cached across
//! requests so issuer key rotation is picked up immediately.

use std::collections::HashMap;

use async_trait::async_trait;
use num_traits::ToPrimitive;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::circuit::limbs::from_base64;
use crate::error::PipelineError;
use crate::types::PublicKeyMaterial;

/// Google's OAuth signing keys
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Key directory settings
#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    /// Fixed keys by `kid`; when non-empty the JWKS endpoint is not used
    #[serde(default)]
    pub static_keys: HashMap<String, PublicKeyMaterial>,
}

fn default_jwks_url() -> String {
    GOOGLE_JWKS_URL.to_string()
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            jwks_url: default_jwks_url(),
            static_keys: HashMap::new(),
        }
    }
}

/// Lookup of an issuer's RSA key by key id
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn fetch(&self, kid: &str) -> Result<PublicKeyMaterial, PipelineError>;
}

/// One entry of a JWK set
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Keys served as a JWK set over HTTP
pub struct JwksKeyDirectory {
    url: String,
    http: reqwest::Client,
}

impl JwksKeyDirectory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

fn not_found(kid: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::KeyNotFound {
        kid: kid.to_string(),
        reason: reason.into(),
    }
}

/// Pick the RSA key `kid` out of a JWK set body.
fn select_key(set: JwkSet, kid: &str) -> Result<PublicKeyMaterial, PipelineError> {
    let jwk = set
        .keys
        .into_iter()
        .find(|k| k.kid.as_deref() == Some(kid))
        .ok_or_else(|| not_found(kid, "no key with this kid in the key set"))?;

    if jwk.kty.as_deref().is_some_and(|kty| kty != "RSA") {
        return Err(not_found(kid, "key is not an RSA key"));
    }
    let modulus = jwk.n.ok_or_else(|| not_found(kid, "key has no modulus"))?;
    let exponent = jwk
        .e
        .as_deref()
        .ok_or_else(|| not_found(kid, "key has no exponent"))
        .and_then(|e| from_base64(e).map_err(|_| not_found(kid, "exponent is not base64")))?
        .to_u64()
        .ok_or_else(|| not_found(kid, "exponent does not fit in 64 bits"))?;

    Ok(PublicKeyMaterial { modulus, exponent })
}

#[async_trait]
impl KeyDirectory for JwksKeyDirectory {
    #[instrument(skip(self))]
    async fn fetch(&self, kid: &str) -> Result<PublicKeyMaterial, PipelineError> {
        let set: JwkSet = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| not_found(kid, format!("key endpoint unavailable: {e}")))?
            .json()
            .await
            .map_err(|e| not_found(kid, format!("key endpoint returned invalid JSON: {e}")))?;

        debug!(keys = set.keys.len(), "Fetched key set");
        select_key(set, kid)
    }
}

/// In-memory keys, for pinned issuers and tests
#[derive(Debug, Clone, Default)]
pub struct StaticKeyDirectory {
    keys: HashMap<String, PublicKeyMaterial>,
}

impl StaticKeyDirectory {
    pub fn new(keys: HashMap<String, PublicKeyMaterial>) -> Self {
        Self { keys }
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: PublicKeyMaterial) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }
}

#[async_trait]
impl KeyDirectory for StaticKeyDirectory {
    async fn fetch(&self, kid: &str) -> Result<PublicKeyMaterial, PipelineError> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| not_found(kid, "unknown kid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(json: serde_json::Value) -> JwkSet {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_selects_key_by_kid() {
        let keys = set(serde_json::json!({
            "keys": [
                {"kid": "old", "kty": "RSA", "alg": "RS256", "n": "AAEC", "e": "AQAB"},
                {"kid": "new", "kty": "RSA", "alg": "RS256", "use": "sig", "n": "wxyz", "e": "AQAB"}
            ]
        }));
        let key = select_key(keys, "new").unwrap();
        assert_eq!(key.modulus, "wxyz");
        assert_eq!(key.exponent, 65537);
    }

    #[test]
    fn test_unknown_kid_and_bad_keys() {
        let keys = || {
            set(serde_json::json!({
                "keys": [
                    {"kid": "ec", "kty": "EC", "n": "AAEC", "e": "AQAB"},
                    {"kid": "no-e", "kty": "RSA", "n": "AAEC"}
                ]
            }))
        };
        for kid in ["missing", "ec", "no-e"] {
            assert!(matches!(
                select_key(keys(), kid),
                Err(PipelineError::KeyNotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_static_directory() {
        let key = PublicKeyMaterial {
            modulus: "AQAB".into(),
            exponent: 3,
        };
        let directory = StaticKeyDirectory::default().with_key("k1", key.clone());

        assert_eq!(directory.fetch("k1").await.unwrap(), key);
        assert!(directory.fetch("k2").await.is_err());
    }
}
