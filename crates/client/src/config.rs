//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

fn default_chain_rpc() -> String {
    "http://127.0.0.1:9944".to_string()
}

fn default_num_malicious() -> u32 {
    1
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Settings shared by every operation of a [`crate::ThresholdClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Custody contract address; also the domain the messages are bound to
    pub contract: String,
    /// Chain JSON-RPC endpoint the engine set is read from
    #[serde(default = "default_chain_rpc")]
    pub chain_rpc: String,
    /// Engines that may be offline or corrupt without losing the secret
    #[serde(default = "default_num_malicious")]
    pub num_malicious: u32,
    /// Per-request HTTP timeout towards engines
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            chain_rpc: default_chain_rpc(),
            num_malicious: default_num_malicious(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.contract.trim().is_empty() {
            return Err(ClientError::Config("contract must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn threshold_params(&self, total: u32) -> ThresholdParams {
        ThresholdParams::from_engine_count(total, self.num_malicious)
    }
}

/// Share count and reconstruction threshold for an engine set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParams {
    pub total: u32,
    pub threshold: u32,
}

impl ThresholdParams {
    /// `threshold = max(1, total - num_malicious)`.
    pub fn from_engine_count(total: u32, num_malicious: u32) -> Self {
        Self {
            total,
            threshold: total.saturating_sub(num_malicious).max(1),
        }
    }

    /// Engines that can fail while the secret stays recoverable.
    pub fn tolerated_failures(&self) -> u32 {
        self.total.saturating_sub(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ClientConfig = serde_json::from_str(r#"{"contract":"custody.testnet"}"#).unwrap();
        assert_eq!(config.chain_rpc, "http://127.0.0.1:9944");
        assert_eq!(config.num_malicious, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_contract() {
        let config = ClientConfig::new("  ");
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("custody-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"contract":"0xc0ffee","num_malicious":2,"request_timeout_secs":5}"#,
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.contract, "0xc0ffee");
        assert_eq!(config.num_malicious, 2);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_threshold_from_engine_count() {
        assert_eq!(ThresholdParams::from_engine_count(3, 1).threshold, 2);
        assert_eq!(ThresholdParams::from_engine_count(5, 2).threshold, 3);
        assert_eq!(ThresholdParams::from_engine_count(1, 1).threshold, 1);
        assert_eq!(ThresholdParams::from_engine_count(2, 7).threshold, 1);
        assert_eq!(ThresholdParams::from_engine_count(4, 0).tolerated_failures(), 0);
    }
}
