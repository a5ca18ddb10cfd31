//! Client error types.
//!
//! Only input errors and engine-set resolution failures surface as
//! `ClientError`. Per-engine failures during a fan-out are folded into the
//! operation outcome instead.

use thiserror::Error;

use custody_crypto::CryptoError;
use custody_types::{AddressError, WalletType};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Message domain is bound to {got}, expected {expected}")]
    DomainMismatch { expected: String, got: String },

    #[error("Message schema {got} does not match {expected}")]
    SchemaMismatch { expected: &'static str, got: String },

    #[error("Upload needs at least one recovering address")]
    NoRecoveringAddress,

    #[error("Share set has {got} shares but the custody contract lists {expected} engines")]
    ShareCountMismatch { expected: usize, got: usize },

    #[error("Share set has threshold {got}, but this engine set requires {expected}")]
    ThresholdMismatch { expected: u32, got: u32 },

    #[error("Share {index} of {total} cannot be stored on engine {position}")]
    MisplacedShare { position: usize, index: u32, total: u32 },

    #[error("Upload message commitments do not match the share set")]
    CommitmentMismatch,

    #[error("Message is authorized by {got}, but the client signs as {expected}")]
    WalletMismatch { expected: WalletType, got: String },

    #[error("Download message public key does not match the ephemeral secret key")]
    EphemeralKeyMismatch,

    #[error("System clock is unusable for message timestamps: {0}")]
    Clock(String),

    #[error("Chain query failed: {0}")]
    Chain(String),

    #[error("Custody contract {0} not found on chain")]
    ContractNotFound(String),

    #[error("Malformed custody state: {0}")]
    MalformedState(String),

    #[error("Custody contract lists no engines")]
    NoEngines,

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}
