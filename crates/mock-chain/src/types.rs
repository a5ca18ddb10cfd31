//! RPC-compatible types for the mock chain.

use serde::{Deserialize, Serialize};

use custody_types::CustodyState;

/// A registered custody contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfoRpc {
    pub contract: String,
    /// Engine endpoints in index order
    pub engines: Vec<String>,
}

impl ContractInfoRpc {
    pub fn new(contract: &str, state: &CustodyState) -> Self {
        Self {
            contract: contract.to_string(),
            engines: state.engines.iter().map(|e| e.endpoint.clone()).collect(),
        }
    }
}
