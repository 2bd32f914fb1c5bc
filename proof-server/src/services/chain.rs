//! Chain access: verifier and report registry
//!
//! Contract calls go through an alloy HTTP provider with `#[sol(rpc)]`
//! bindings. The sender account is managed by the node, so writes are plain
//! `eth_sendTransaction` requests from `sender`.

use std::str::FromStr;

use alloy::contract::Error as ContractError;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::sol_types::{Revert, SolError, SolEvent};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::calldata::CallArguments;
use crate::error::PipelineError;

sol! {
    struct Report {
        string title;
        string content;
        uint256 timestamp;
        uint256 organizationHash;
    }

    #[sol(rpc)]
    interface IReportRegistry {
        event ReportSubmitted(uint256 indexed reportId, uint256 indexed organizationHash, uint256 timestamp);

        function submitReport(
            string title,
            string content,
            uint256[2] pA,
            uint256[2][2] pB,
            uint256[2] pC,
            uint256[2] pubSignals
        ) external returns (uint256);

        function getReport(uint256 reportId) external view returns (Report memory);

        function reportCount() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IGroth16Verifier {
        function verifyProof(
            uint256[2] pA,
            uint256[2][2] pB,
            uint256[2] pC,
            uint256[2] pubSignals
        ) external view returns (bool);
    }
}

/// Chain endpoint settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint; no chain access when unset
    pub rpc_url: Option<String>,
    /// Report registry contract
    pub registry_address: Option<String>,
    /// Groth16 verifier contract
    pub verifier_address: Option<String>,
    /// Node-managed account that sends submissions
    pub sender: Option<String>,
}

impl ChainConfig {
    pub fn is_configured(&self) -> bool {
        self.rpc_url.is_some() && self.registry_address.is_some()
    }
}

/// A report as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainReport {
    pub id: U256,
    pub title: String,
    pub content: String,
    pub timestamp: U256,
    pub organization_hash: U256,
}

/// Read/write access to the verifier and registry contracts
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Send `submitReport`; returns the transaction hash
    async fn submit_report(
        &self,
        title: &str,
        content: &str,
        args: &CallArguments,
    ) -> Result<TxHash, PipelineError>;

    /// Report id from the `ReportSubmitted` event of `tx`, `None` while the
    /// transaction is not yet mined
    async fn find_report_submitted(&self, tx: TxHash) -> Result<Option<U256>, PipelineError>;

    async fn get_report(&self, id: U256) -> Result<OnChainReport, PipelineError>;

    async fn report_count(&self) -> Result<U256, PipelineError>;

    /// Read-only verifier check
    async fn verify_proof(&self, args: &CallArguments) -> Result<bool, PipelineError>;
}

/// Classify a node error message. Reuse detection wins over generic reverts.
pub fn classify_rejection(message: &str, reason: Option<String>) -> PipelineError {
    let text = reason.as_deref().unwrap_or(message);
    if text.to_ascii_lowercase().contains("already used")
        || message.to_ascii_lowercase().contains("already used")
    {
        return PipelineError::ProofReuseConflict { tx_hash: None };
    }
    if reason.is_some() || message.contains("revert") {
        return PipelineError::ChainRevert {
            reason: reason.or_else(|| Some(message.to_string())),
        };
    }
    PipelineError::ChainUnavailable(message.to_string())
}

/// The string of a Solidity `Error(string)` revert payload
pub fn revert_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data).ok().map(|revert| revert.reason)
}

fn rejection(method: &str, err: ContractError) -> PipelineError {
    let reason = err.as_revert_data().and_then(|data| revert_reason(&data));
    debug!(method, ?reason, error = %err, "Contract call failed");
    classify_rejection(&format!("{method}: {err}"), reason)
}

fn parse_address(value: &str, name: &str) -> Result<Address, PipelineError> {
    Address::from_str(value)
        .map_err(|e| PipelineError::ChainUnavailable(format!("invalid {name} address: {e}")))
}

/// [`ChainClient`] over an alloy HTTP provider
pub struct AlloyChainClient {
    provider: DynProvider,
    registry: Address,
    verifier: Option<Address>,
    sender: Option<Address>,
}

impl AlloyChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, PipelineError> {
        let url: reqwest::Url = config
            .rpc_url
            .as_deref()
            .ok_or(PipelineError::ChainNotConfigured)?
            .parse()
            .map_err(|e| PipelineError::ChainUnavailable(format!("invalid rpc url: {e}")))?;
        let registry = config
            .registry_address
            .as_deref()
            .ok_or(PipelineError::ChainNotConfigured)
            .and_then(|a| parse_address(a, "registry"))?;
        let verifier = config
            .verifier_address
            .as_deref()
            .map(|a| parse_address(a, "verifier"))
            .transpose()?;
        let sender = config
            .sender
            .as_deref()
            .map(|a| parse_address(a, "sender"))
            .transpose()?;

        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self {
            provider,
            registry,
            verifier,
            sender,
        })
    }

    fn registry(&self) -> IReportRegistry::IReportRegistryInstance<DynProvider> {
        IReportRegistry::new(self.registry, self.provider.clone())
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    #[instrument(skip(self, title, content, args), fields(title_len = title.len(), content_len = content.len()))]
    async fn submit_report(
        &self,
        title: &str,
        content: &str,
        args: &CallArguments,
    ) -> Result<TxHash, PipelineError> {
        let sender = self.sender.ok_or(PipelineError::ChainNotConfigured)?;
        let registry = self.registry();
        let call = registry
            .submitReport(
                title.to_string(),
                content.to_string(),
                args.p_a,
                args.p_b,
                args.p_c,
                args.pub_signals_array()?,
            )
            .from(sender);

        // dry run first so reverts come back with their reason
        call.call().await.map_err(|e| rejection("submitReport", e))?;

        let pending = call.send().await.map_err(|e| rejection("submitReport", e))?;
        Ok(*pending.tx_hash())
    }

    async fn find_report_submitted(&self, tx: TxHash) -> Result<Option<U256>, PipelineError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| PipelineError::ChainUnavailable(format!("receipt of {tx}: {e}")))?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        if !receipt.status() {
            return Err(PipelineError::ChainRevert { reason: None });
        }

        let id = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.address() == self.registry)
            .find_map(|log| IReportRegistry::ReportSubmitted::decode_log(log.as_ref()).ok())
            .map(|event| event.reportId);
        if id.is_none() {
            warn!(%tx, "Receipt carries no ReportSubmitted event");
        }
        Ok(id)
    }

    async fn get_report(&self, id: U256) -> Result<OnChainReport, PipelineError> {
        let report = self
            .registry()
            .getReport(id)
            .call()
            .await
            .map_err(|e| rejection("getReport", e))?;
        Ok(OnChainReport {
            id,
            title: report.title,
            content: report.content,
            timestamp: report.timestamp,
            organization_hash: report.organizationHash,
        })
    }

    async fn report_count(&self) -> Result<U256, PipelineError> {
        self.registry()
            .reportCount()
            .call()
            .await
            .map_err(|e| rejection("reportCount", e))
    }

    async fn verify_proof(&self, args: &CallArguments) -> Result<bool, PipelineError> {
        let verifier = self.verifier.ok_or(PipelineError::ChainNotConfigured)?;
        IGroth16Verifier::new(verifier, self.provider.clone())
            .verifyProof(args.p_a, args.p_b, args.p_c, args.pub_signals_array()?)
            .call()
            .await
            .map_err(|e| rejection("verifyProof", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{LogData, B256};
    use alloy::sol_types::SolCall;

    #[test]
    fn test_reuse_detected_in_reason_or_message() {
        assert!(matches!(
            classify_rejection("execution reverted", Some("Proof already used".into())),
            PipelineError::ProofReuseConflict { tx_hash: None }
        ));
        assert!(matches!(
            classify_rejection("execution reverted: Proof already used", None),
            PipelineError::ProofReuseConflict { .. }
        ));
    }

    #[test]
    fn test_revert_keeps_reason() {
        match classify_rejection("execution reverted", Some("Invalid proof".into())) {
            PipelineError::ChainRevert { reason } => assert_eq!(reason.as_deref(), Some("Invalid proof")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify_rejection("connection refused", None),
            PipelineError::ChainUnavailable(_)
        ));
    }

    #[test]
    fn test_revert_data_decodes_to_bare_reason() {
        let data = Revert {
            reason: "Proof already used".to_string(),
        }
        .abi_encode();
        assert_eq!(revert_reason(&data).as_deref(), Some("Proof already used"));
        assert_eq!(revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);

        match classify_rejection("execution reverted", revert_reason(
            &Revert { reason: "Invalid proof".to_string() }.abi_encode(),
        )) {
            PipelineError::ChainRevert { reason } => assert_eq!(reason.as_deref(), Some("Invalid proof")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_submit_report_selector_and_layout() {
        let call = IReportRegistry::submitReportCall {
            title: "t".into(),
            content: "c".into(),
            pA: [U256::from(1), U256::from(2)],
            pB: [[U256::from(3), U256::from(4)], [U256::from(5), U256::from(6)]],
            pC: [U256::from(7), U256::from(8)],
            pubSignals: [U256::from(9), U256::from(10)],
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], &IReportRegistry::submitReportCall::SELECTOR);
        let decoded = IReportRegistry::submitReportCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded.pB[0][1], U256::from(4));
        assert_eq!(decoded.content, "c");
    }

    #[test]
    fn test_report_submitted_event_decodes() {
        let registry = Address::repeat_byte(0x11);
        let data = LogData::new_unchecked(
            vec![
                IReportRegistry::ReportSubmitted::SIGNATURE_HASH,
                B256::left_padding_from(&[42]),
                B256::left_padding_from(&[7]),
            ],
            U256::from(1_700_000_000u64).to_be_bytes_vec().into(),
        );
        let log = alloy::primitives::Log { address: registry, data };

        let event = IReportRegistry::ReportSubmitted::decode_log(&log).unwrap();
        assert_eq!(event.reportId, U256::from(42u64));
        assert_eq!(event.organizationHash, U256::from(7u64));
        assert_eq!(event.timestamp, U256::from(1_700_000_000u64));
    }

    #[test]
    fn test_unconfigured_client_is_rejected() {
        assert!(matches!(
            AlloyChainClient::new(&ChainConfig::default()),
            Err(PipelineError::ChainNotConfigured)
        ));
        let bad = ChainConfig {
            rpc_url: Some("http://localhost:8545".into()),
            registry_address: Some("not-an-address".into()),
            ..ChainConfig::default()
        };
        assert!(matches!(
            AlloyChainClient::new(&bad),
            Err(PipelineError::ChainUnavailable(_))
        ));
        let bad_url = ChainConfig {
            rpc_url: Some("not a url".into()),
            registry_address: Some(format!("{}", Address::repeat_byte(0x11))),
            ..ChainConfig::default()
        };
        assert!(matches!(
            AlloyChainClient::new(&bad_url),
            Err(PipelineError::ChainUnavailable(_))
        ));
    }

    #[test]
    fn test_configured_client_builds_without_connecting() {
        let config = ChainConfig {
            rpc_url: Some("http://localhost:8545".into()),
            registry_address: Some(format!("{}", Address::repeat_byte(0x11))),
            verifier_address: Some(format!("{}", Address::repeat_byte(0x22))),
            sender: None,
        };
        let client = AlloyChainClient::new(&config).unwrap();
        assert_eq!(client.registry, Address::repeat_byte(0x11));
        assert_eq!(client.verifier, Some(Address::repeat_byte(0x22)));
    }
}
