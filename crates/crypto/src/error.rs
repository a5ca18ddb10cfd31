//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid threshold {threshold} for {total} shares")]
    InvalidThreshold { threshold: u32, total: u32 },

    #[error("Secret of {0} bytes is too large to split")]
    SecretTooLarge(usize),

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Insufficient threshold shares: need {required}, got {got}")]
    InsufficientShares { required: usize, got: usize },

    #[error("Invalid share index")]
    InvalidShareIndex,

    #[error("Duplicate share index {0} with differing contents")]
    DuplicateShareIndex(u32),

    #[error("Shares come from different splits")]
    InconsistentShares,

    #[error("Lagrange interpolation failed")]
    LagrangeInterpolationFailed,

    #[error("Reconstructed secret failed its integrity check")]
    IntegrityCheckFailed,

    #[error("Blinded share is shorter than the blinding prefix")]
    BlindedShareTooShort,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid nonce length {0}")]
    InvalidNonce(usize),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
