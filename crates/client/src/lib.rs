//! Client SDK for threshold secret custody.
//!
//! This crate provides a high-level API for:
//! - Building the authorization messages a wallet signs
//! - Splitting and blinding a secret into one share per engine
//! - Uploading shares to, and recovering them from, the engine set
//! - Adding and removing recovering addresses on every engine

pub mod auth;
pub mod chain;
pub mod config;
pub mod error;
pub mod outcome;
pub mod threshold;
pub mod transport;

pub use auth::{Domain, MessageSchema, SignableMessage};
pub use chain::{CustodyChain, RpcCustodyChain};
pub use config::{ClientConfig, ThresholdParams};
pub use error::ClientError;
pub use outcome::{DownloadOutcome, DownloadStatus, WriteOutcome, WriteStatus};
pub use threshold::{EngineSet, ThresholdClient};
pub use transport::{EngineConnector, EngineTransport, HttpConnector, HttpEngine};

pub use jsonrpsee::core::async_trait;
