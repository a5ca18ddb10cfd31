//! Mock chain server for local testing of threshold custody.
//!
//! This provides a JSON-RPC server that holds custody contract state (the
//! engine list of each contract) without requiring a real blockchain.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use tracing::info;

use custody_types::{CustodyState, EngineRecord};

pub mod types;
pub use types::ContractInfoRpc;

/// RPC API definition for the mock chain.
#[rpc(server)]
pub trait MockChainApi {
    // ============ Admin Methods ============

    /// Register a contract, replacing its engine list if it already exists.
    #[method(name = "admin_registerContract")]
    async fn admin_register_contract(
        &self,
        contract: String,
        endpoints: Vec<String>,
    ) -> Result<bool, ErrorObjectOwned>;

    /// Remove a contract.
    #[method(name = "admin_removeContract")]
    async fn admin_remove_contract(&self, contract: String) -> Result<bool, ErrorObjectOwned>;

    // ============ Query Methods ============

    /// Borsh-encoded custody state (hex), if the contract exists.
    #[method(name = "query_getCustodyState")]
    async fn query_get_custody_state(
        &self,
        contract: String,
    ) -> Result<Option<String>, ErrorObjectOwned>;

    /// List all registered contracts.
    #[method(name = "query_listContracts")]
    async fn query_list_contracts(&self) -> Result<Vec<ContractInfoRpc>, ErrorObjectOwned>;
}

/// Mock chain server implementation.
#[derive(Clone, Default)]
pub struct MockChainServer {
    contracts: Arc<RwLock<BTreeMap<String, CustodyState>>>,
}

impl MockChainServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract without going through RPC.
    pub fn register(&self, contract: &str, endpoints: Vec<String>) {
        let state = CustodyState {
            engines: endpoints
                .into_iter()
                .map(|endpoint| EngineRecord { endpoint })
                .collect(),
        };
        info!(contract, engines = state.engines.len(), "Registered custody contract");
        self.contracts.write().insert(contract.to_string(), state);
    }

    fn rpc_error(msg: &str) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000, msg.to_string(), None::<()>)
    }
}

#[async_trait]
impl MockChainApiServer for MockChainServer {
    async fn admin_register_contract(
        &self,
        contract: String,
        endpoints: Vec<String>,
    ) -> Result<bool, ErrorObjectOwned> {
        if contract.is_empty() {
            return Err(Self::rpc_error("Contract address must not be empty"));
        }
        self.register(&contract, endpoints);
        Ok(true)
    }

    async fn admin_remove_contract(&self, contract: String) -> Result<bool, ErrorObjectOwned> {
        let removed = self.contracts.write().remove(&contract).is_some();
        if removed {
            info!(%contract, "Removed custody contract");
        }
        Ok(removed)
    }

    async fn query_get_custody_state(
        &self,
        contract: String,
    ) -> Result<Option<String>, ErrorObjectOwned> {
        let contracts = self.contracts.read();
        contracts
            .get(&contract)
            .map(|state| {
                borsh::to_vec(state)
                    .map(hex::encode)
                    .map_err(|e| Self::rpc_error(&format!("Failed to encode state: {}", e)))
            })
            .transpose()
    }

    async fn query_list_contracts(&self) -> Result<Vec<ContractInfoRpc>, ErrorObjectOwned> {
        let contracts = self.contracts.read();
        Ok(contracts
            .iter()
            .map(|(contract, state)| ContractInfoRpc::new(contract, state))
            .collect())
    }
}

/// Start the server on `addr`, returning the bound address and its handle.
pub async fn serve(addr: SocketAddr, chain: MockChainServer) -> Result<(SocketAddr, ServerHandle)> {
    let server = Server::builder().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(chain.into_rpc());
    info!("Mock chain server listening on {}", local_addr);
    Ok((local_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::http_client::HttpClientBuilder;
    use jsonrpsee::rpc_params;

    #[tokio::test]
    async fn test_register_and_query_state() {
        let (addr, handle) = serve("127.0.0.1:0".parse().unwrap(), MockChainServer::new())
            .await
            .unwrap();
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap();

        let registered: bool = client
            .request(
                "admin_registerContract",
                rpc_params!["custody.testnet", vec!["http://e0", "http://e1"]],
            )
            .await
            .unwrap();
        assert!(registered);

        let state: Option<String> = client
            .request("query_getCustodyState", vec!["custody.testnet"])
            .await
            .unwrap();
        let state: CustodyState = borsh::from_slice(&hex::decode(state.unwrap()).unwrap()).unwrap();
        assert_eq!(state.engines[1].endpoint, "http://e1");

        let missing: Option<String> = client
            .request("query_getCustodyState", vec!["unknown"])
            .await
            .unwrap();
        assert!(missing.is_none());

        let contracts: Vec<ContractInfoRpc> = client
            .request("query_listContracts", rpc_params![])
            .await
            .unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].engines, vec!["http://e0", "http://e1"]);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_register_replaces_and_remove_deletes() {
        let chain = MockChainServer::new();
        chain.register("c", vec!["http://a".into()]);
        chain.register("c", vec!["http://b".into(), "http://c".into()]);

        let listed = chain.query_list_contracts().await.unwrap();
        assert_eq!(listed[0].engines, vec!["http://b", "http://c"]);

        assert!(chain.admin_remove_contract("c".into()).await.unwrap());
        assert!(!chain.admin_remove_contract("c".into()).await.unwrap());
        assert!(chain.query_get_custody_state("c".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_contract_name_rejected() {
        let chain = MockChainServer::new();
        assert!(chain.admin_register_contract(String::new(), vec![]).await.is_err());
    }
}
