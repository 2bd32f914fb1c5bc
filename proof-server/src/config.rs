//! Server Configuration
//!
//! Loaded from an optional config file, then environment variables
//! (`ORG_PROOF_` prefix, `__` between nested keys), after `.env`.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::circuit::{LimbLayout, ShaPadding};
use crate::services::{ChainConfig, ConfirmationPolicy, KeysConfig, ProverConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
    /// JSON map of organization commitment → name
    pub organization_directory: Option<PathBuf>,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
    /// CORS allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Maximum concurrent proof requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_proofs: usize,
    /// Development mode - proofs are mocked
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            json_logs: false,
            cors_origins: default_cors_origins(),
            max_concurrent_proofs: default_max_concurrent(),
            dev_mode: false,
        }
    }
}

/// Parameters fixed by the compiled circuit
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_limb_bits")]
    pub limb_bits: usize,
    #[serde(default = "default_limb_count")]
    pub limb_count: usize,
    /// Message capacity in bytes
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_block_size")]
    pub sha_block_size: usize,
    #[serde(default = "default_max_domain_length")]
    pub max_domain_length: usize,
    /// Claim holding the email address
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    #[serde(default = "default_rsa_exponent")]
    pub rsa_exponent: u64,
    /// Check RS256 signatures before proving
    #[serde(default = "default_true")]
    pub verify_signature: bool,
}

fn default_limb_bits() -> usize {
    LimbLayout::RSA_2048.limb_bits
}

fn default_limb_count() -> usize {
    LimbLayout::RSA_2048.limb_count
}

fn default_max_message_length() -> usize {
    2048
}

fn default_block_size() -> usize {
    64
}

fn default_max_domain_length() -> usize {
    255
}

fn default_identity_field() -> String {
    "email".to_string()
}

fn default_rsa_exponent() -> u64 {
    65537
}

fn default_true() -> bool {
    true
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            limb_bits: default_limb_bits(),
            limb_count: default_limb_count(),
            max_message_length: default_max_message_length(),
            sha_block_size: default_block_size(),
            max_domain_length: default_max_domain_length(),
            identity_field: default_identity_field(),
            rsa_exponent: default_rsa_exponent(),
            verify_signature: true,
        }
    }
}

impl CircuitConfig {
    pub fn limb_layout(&self) -> LimbLayout {
        LimbLayout::new(self.limb_bits, self.limb_count)
    }

    pub fn sha_padding(&self) -> ShaPadding {
        ShaPadding::new(self.sha_block_size, self.max_message_length)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limb_bits == 0 || self.limb_count == 0 {
            return Err(ConfigError::Invalid(
                "limb_bits and limb_count must be positive".to_string(),
            ));
        }
        if self.sha_block_size == 0 || self.max_message_length % self.sha_block_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "max_message_length {} is not a multiple of the block size {}",
                self.max_message_length, self.sha_block_size
            )));
        }
        if self.max_domain_length == 0 {
            return Err(ConfigError::Invalid(
                "max_domain_length must be positive".to_string(),
            ));
        }
        if self.identity_field.is_empty() {
            return Err(ConfigError::Invalid("identity_field is empty".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from `CONFIG_FILE` (default `config/default`, any
    /// format the `config` crate knows) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let file = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default".to_string());
        let mut config: Config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("ORG_PROOF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .build()?
            .try_deserialize()?;

        if std::env::var("DEV_MODE").unwrap_or_default() == "true" {
            config.server.dev_mode = true;
        }
        if config.server.dev_mode {
            config.prover.dev_mode = true;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.circuit.validate()?;
        if self.server.max_concurrent_proofs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_proofs must be positive".to_string(),
            ));
        }
        if self.confirmation.attempts == 0 {
            return Err(ConfigError::Invalid(
                "confirmation.attempts must be positive".to_string(),
            ));
        }
        if self.prover.timeout_secs == 0 {
            return Err(ConfigError::Invalid("prover.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid socket address: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_circuit() {
        let config = Config::default();
        assert_eq!(config.circuit.limb_layout(), LimbLayout::new(121, 17));
        assert_eq!(config.circuit.sha_padding(), ShaPadding::new(64, 2048));
        assert_eq!(config.confirmation.attempts, 5);
        assert_eq!(config.prover.timeout_secs, 300);
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_rejects_unaligned_capacity() {
        let mut config = Config::default();
        config.circuit.max_message_length = 2000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_nested_sections_deserialize() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                organization_directory = "domains.json"

                [server]
                port = 8080

                [circuit]
                max_domain_length = 64
                verify_signature = false

                [prover]
                backend = "remote"
                remote_url = "http://prover:9000/prove"

                [confirmation]
                attempts = 2
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.circuit.max_domain_length, 64);
        assert!(!config.circuit.verify_signature);
        assert_eq!(config.circuit.limb_count, 17);
        assert_eq!(config.prover.backend, crate::services::prover::BackendKind::Remote);
        assert_eq!(config.confirmation.attempts, 2);
        assert_eq!(config.confirmation.interval_ms, 3000);
        assert_eq!(
            config.organization_directory,
            Some(PathBuf::from("domains.json"))
        );
    }
}
