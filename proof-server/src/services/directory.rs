//! Organization names by commitment
//!
//! Read-only map from the 32-byte organization commitment (public signal 0)
//! to a display name, loaded from a JSON object whose keys are `0x`-prefixed
//! 64-digit hex strings.

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::U256;
use thiserror::Error;
use tracing::{info, warn};

/// Name used when a commitment has no entry
pub const UNKNOWN_ORGANIZATION: &str = "Unknown Organization";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to read organization directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Organization directory is not a JSON object of strings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationDirectory {
    names: HashMap<U256, String>,
}

impl OrganizationDirectory {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (U256, S)>,
        S: Into<String>,
    {
        Self {
            names: entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    /// Parse the JSON map. Keys that are not hex commitments are skipped.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let mut names = HashMap::with_capacity(raw.len());
        for (key, name) in raw {
            match parse_commitment(&key) {
                Some(commitment) => {
                    names.insert(commitment, name);
                }
                None => warn!(%key, "Skipping malformed organization commitment"),
            }
        }
        Ok(Self { names })
    }

    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let directory = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), organizations = directory.len(), "Loaded organization directory");
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, commitment: &U256) -> Option<&str> {
        self.names.get(commitment).map(String::as_str)
    }

    /// Name for `commitment`, or [`UNKNOWN_ORGANIZATION`]
    pub fn resolve(&self, commitment: &U256) -> &str {
        self.get(commitment).unwrap_or(UNKNOWN_ORGANIZATION)
    }

    /// Same as [`Self::resolve`] for a decimal or hex string signal
    pub fn resolve_signal(&self, signal: &str) -> &str {
        parse_signal(signal)
            .map(|c| self.resolve(&c))
            .unwrap_or(UNKNOWN_ORGANIZATION)
    }
}

/// `0x` + 64 lowercase hex digits, the directory key format
pub fn commitment_key(commitment: &U256) -> String {
    format!("0x{}", hex::encode(commitment.to_be_bytes::<32>()))
}

fn parse_commitment(key: &str) -> Option<U256> {
    let digits = key.strip_prefix("0x")?;
    if digits.len() != 64 {
        return None;
    }
    U256::from_str_radix(digits, 16).ok()
}

fn parse_signal(signal: &str) -> Option<U256> {
    match signal.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_str_radix(signal, 10).ok(),
    }
}
