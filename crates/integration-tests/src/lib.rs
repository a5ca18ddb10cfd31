//! End-to-end integration tests for threshold secret custody.
//!
//! Each test starts a mock chain and a set of in-process engines over real
//! HTTP, then drives the client through:
//! 1. Engine set resolution from chain state
//! 2. Split, blind and upload
//! 3. Sealed download and reconstruction
//! 4. Adding and removing recovering addresses

use std::net::SocketAddr;

use anyhow::Result;
use jsonrpsee::server::ServerHandle;

use custody_client::{ClientConfig, ThresholdClient};
use custody_mock_chain::{serve, MockChainServer};
use custody_types::WalletType;

pub mod engine;

pub use engine::{EngineStub, Mode};

/// A mock chain plus one running engine per registered endpoint.
pub struct Cluster {
    pub contract: String,
    pub engines: Vec<EngineStub>,
    pub chain: MockChainServer,
    chain_addr: SocketAddr,
    chain_handle: ServerHandle,
}

impl Cluster {
    pub async fn start(contract: &str, engines: usize) -> Result<Self> {
        let mut stubs = Vec::with_capacity(engines);
        for _ in 0..engines {
            stubs.push(EngineStub::spawn(contract).await?);
        }

        let chain = MockChainServer::new();
        chain.register(contract, stubs.iter().map(EngineStub::endpoint).collect());
        let (chain_addr, chain_handle) = serve("127.0.0.1:0".parse()?, chain.clone()).await?;

        Ok(Self {
            contract: contract.to_string(),
            engines: stubs,
            chain,
            chain_addr,
            chain_handle,
        })
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            contract: self.contract.clone(),
            chain_rpc: format!("http://{}", self.chain_addr),
            num_malicious: 1,
            request_timeout_secs: 5,
        }
    }

    pub fn client(&self, wallet: WalletType) -> Result<ThresholdClient> {
        Ok(ThresholdClient::connect(self.config(), wallet)?)
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        let _ = self.chain_handle.stop();
    }
}
