//! Core type definitions for threshold secret custody.
//!
//! This crate provides the data structures shared between the custody client,
//! the engine nodes it talks to and the chain state that lists those engines.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

pub mod wallet;
pub mod wire;

pub use wallet::{AddressError, RecoveringAddress, WalletIdentity, WalletType};
pub use wire::{
    AddAddressMessage, DownloadMessage, EncryptedShareResponse, RemoveAddressMessage,
    UploadMessage, UploadShareRequest,
};

// =========================
// SHARES
// =========================

/// Number of random bytes prepended to a serialized share before upload.
pub const BLINDING_LEN: usize = 32;

/// Identifier shared by every share produced from one split.
pub type SetId = [u8; 16];

/// One Shamir share of a secret.
///
/// Each entry of `chunks` is the little-endian encoding of a BLS12-381 scalar,
/// the evaluation at `x = index + 1` of the polynomial hiding that chunk.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Share {
    /// Random tag common to all shares of one split
    pub set_id: SetId,
    /// Position of this share (0-based)
    pub index: u32,
    /// Shares needed to reconstruct
    pub threshold: u32,
    /// Shares produced by the split
    pub total: u32,
    /// Polynomial evaluations, one per secret chunk
    pub chunks: Vec<[u8; 32]>,
}

/// SHA-256 commitment to a blinded share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ShareCommitment(pub [u8; 32]);

impl ShareCommitment {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// =========================
// CHAIN STATE
// =========================

/// One engine node as recorded in the custody contract.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EngineRecord {
    pub endpoint: String,
}

/// Custody contract state as stored on chain.
///
/// The position of a record in `engines` is the engine's logical index.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CustodyState {
    pub engines: Vec<EngineRecord>,
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_borsh_roundtrip() {
        let share = Share {
            set_id: [7u8; 16],
            index: 2,
            threshold: 2,
            total: 3,
            chunks: vec![[1u8; 32], [2u8; 32]],
        };
        let encoded = borsh::to_vec(&share).unwrap();
        let decoded: Share = borsh::from_slice(&encoded).unwrap();
        assert_eq!(share, decoded);
    }

    #[test]
    fn test_custody_state_keeps_engine_order() {
        let state = CustodyState {
            engines: vec![
                EngineRecord { endpoint: "http://engine-0".into() },
                EngineRecord { endpoint: "http://engine-1".into() },
            ],
        };
        let encoded = borsh::to_vec(&state).unwrap();
        let decoded: CustodyState = borsh::from_slice(&encoded).unwrap();
        assert_eq!(decoded.engines[1].endpoint, "http://engine-1");
    }

    #[test]
    fn test_commitment_hex() {
        let commitment = ShareCommitment(sha256(b"share"));
        assert_eq!(commitment.to_hex().len(), 64);
    }
}
