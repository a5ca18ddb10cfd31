//! Chain-state reader for the custody contract.

use std::time::Duration;

use jsonrpsee::core::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use custody_types::CustodyState;

use crate::error::ClientError;

/// Read access to the serialized custody contract state.
#[async_trait]
pub trait CustodyChain: Send + Sync {
    /// Borsh-encoded [`CustodyState`] of `contract`.
    async fn custody_state(&self, contract: &str) -> Result<Vec<u8>, ClientError>;
}

/// [`CustodyChain`] over the chain's JSON-RPC endpoint.
pub struct RpcCustodyChain {
    client: HttpClient,
}

impl RpcCustodyChain {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| ClientError::Chain(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CustodyChain for RpcCustodyChain {
    async fn custody_state(&self, contract: &str) -> Result<Vec<u8>, ClientError> {
        let state: Option<String> = self
            .client
            .request("query_getCustodyState", vec![contract])
            .await
            .map_err(|e| ClientError::Chain(e.to_string()))?;

        let state = state.ok_or_else(|| ClientError::ContractNotFound(contract.to_string()))?;
        hex::decode(state.trim_start_matches("0x"))
            .map_err(|e| ClientError::MalformedState(e.to_string()))
    }
}

/// Decode contract state, requiring at least one engine.
pub fn decode_custody_state(bytes: &[u8]) -> Result<CustodyState, ClientError> {
    let state: CustodyState =
        borsh::from_slice(bytes).map_err(|e| ClientError::MalformedState(e.to_string()))?;
    if state.engines.is_empty() {
        return Err(ClientError::NoEngines);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::EngineRecord;

    #[test]
    fn test_decode_custody_state() {
        let state = CustodyState {
            engines: vec![
                EngineRecord { endpoint: "http://a".into() },
                EngineRecord { endpoint: "http://b".into() },
            ],
        };
        let decoded = decode_custody_state(&borsh::to_vec(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        let empty = borsh::to_vec(&CustodyState::default()).unwrap();
        assert!(matches!(decode_custody_state(&empty), Err(ClientError::NoEngines)));
        assert!(matches!(
            decode_custody_state(&[9, 9, 9]),
            Err(ClientError::MalformedState(_))
        ));
    }
}
