//! Authorization message bodies and engine HTTP payloads.
//!
//! Field names are part of the signed schema and of the engine REST API;
//! renaming a field changes what wallets sign.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::RecoveringAddress;

/// Upload authorization: binds the commitments of every blinded share to
/// the wallets allowed to recover them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMessage {
    /// Hex-encoded SHA-256 of each blinded share, in engine order
    pub share_commitments: Vec<String>,
    pub recovering_addresses: Vec<RecoveringAddress>,
}

/// Download authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMessage {
    pub recovering_address: RecoveringAddress,
    /// Unix time in milliseconds
    pub timestamp: u64,
    /// Hex-encoded X25519 key the engine seals the returned share to
    pub public_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAddressMessage {
    pub recovering_address: RecoveringAddress,
    pub address_to_add: RecoveringAddress,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAddressMessage {
    pub recovering_address: RecoveringAddress,
    pub address_to_remove: RecoveringAddress,
    pub timestamp: u64,
}

/// Body of `PUT /offchain/{contract}/shares/{id}`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadShareRequest {
    pub share_commitments: Vec<String>,
    pub recovering_addresses: Vec<RecoveringAddress>,
    /// Blinded share bytes
    #[serde_as(as = "Hex")]
    pub share_data: Vec<u8>,
}

impl UploadShareRequest {
    pub fn new(message: &UploadMessage, share_data: Vec<u8>) -> Self {
        Self {
            share_commitments: message.share_commitments.clone(),
            recovering_addresses: message.recovering_addresses.clone(),
            share_data,
        }
    }
}

/// Successful body of `POST /offchain/{contract}/shares/{id}`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShareResponse {
    /// Blinded share sealed to the requester's ephemeral key
    #[serde_as(as = "Hex")]
    pub encrypted_share: Vec<u8>,
    /// The engine's X25519 public key
    #[serde_as(as = "Hex")]
    pub public_key: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub nonce: Vec<u8>,
}
