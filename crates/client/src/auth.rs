//! Authorization messages signed by the user's wallet.
//!
//! Every message is wrapped in a [`SignableMessage`] carrying a domain bound to
//! the custody contract, so a signature for one contract (or one message
//! type) cannot be replayed against another.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use custody_crypto::{BlindedShareSet, BoxPublicKey};
use custody_types::{
    sha256, AddAddressMessage, DownloadMessage, RemoveAddressMessage, UploadMessage,
    WalletIdentity,
};

use crate::error::ClientError;

pub const DOMAIN_NAME: &str = "ThresholdCustody";
pub const DOMAIN_VERSION: &str = "1";

/// Domain separator of every authorization message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub verifying_contract: String,
}

impl Domain {
    pub fn for_contract(contract: impl Into<String>) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            verifying_contract: contract.into(),
        }
    }
}

/// A message body with a fixed, named schema.
pub trait MessageSchema: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const PRIMARY_TYPE: &'static str;
}

impl MessageSchema for UploadMessage {
    const PRIMARY_TYPE: &'static str = "Upload";
}

impl MessageSchema for DownloadMessage {
    const PRIMARY_TYPE: &'static str = "Download";
}

impl MessageSchema for AddAddressMessage {
    const PRIMARY_TYPE: &'static str = "AddAddress";
}

impl MessageSchema for RemoveAddressMessage {
    const PRIMARY_TYPE: &'static str = "RemoveAddress";
}

/// The exact payload handed to the wallet for signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableMessage<M> {
    pub domain: Domain,
    pub primary_type: String,
    pub message: M,
}

impl<M: MessageSchema> SignableMessage<M> {
    pub fn new(domain: Domain, message: M) -> Self {
        Self {
            domain,
            primary_type: M::PRIMARY_TYPE.to_string(),
            message,
        }
    }

    /// Bytes the wallet signs. Field order is fixed by the type definitions.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ClientError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// SHA-256 of [`Self::signing_bytes`], for signers that take a digest.
    pub fn digest(&self) -> Result<[u8; 32], ClientError> {
        Ok(sha256(&self.signing_bytes()?))
    }

    /// Reject messages built for another contract, domain version or type.
    pub fn check_domain(&self, expected: &Domain) -> Result<(), ClientError> {
        if &self.domain != expected {
            return Err(ClientError::DomainMismatch {
                expected: format!(
                    "{} v{} @ {}",
                    expected.name, expected.version, expected.verifying_contract
                ),
                got: format!(
                    "{} v{} @ {}",
                    self.domain.name, self.domain.version, self.domain.verifying_contract
                ),
            });
        }
        if self.primary_type != M::PRIMARY_TYPE {
            return Err(ClientError::SchemaMismatch {
                expected: M::PRIMARY_TYPE,
                got: self.primary_type.clone(),
            });
        }
        Ok(())
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> Result<u64, ClientError> {
    millis_since_epoch(SystemTime::now())
}

fn millis_since_epoch(time: SystemTime) -> Result<u64, ClientError> {
    let elapsed = time
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ClientError::Clock(e.to_string()))?;
    u64::try_from(elapsed.as_millis()).map_err(|e| ClientError::Clock(e.to_string()))
}

pub fn upload_message_to_sign(
    domain: &Domain,
    shares: &BlindedShareSet,
    recovering: &[WalletIdentity],
) -> Result<SignableMessage<UploadMessage>, ClientError> {
    if recovering.is_empty() {
        return Err(ClientError::NoRecoveringAddress);
    }
    let recovering_addresses = recovering
        .iter()
        .map(WalletIdentity::recovering_address)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SignableMessage::new(
        domain.clone(),
        UploadMessage {
            share_commitments: shares.commitment_hex(),
            recovering_addresses,
        },
    ))
}

pub fn download_message_to_sign(
    domain: &Domain,
    wallet: &WalletIdentity,
    ephemeral_public_key: &BoxPublicKey,
    timestamp: u64,
) -> Result<SignableMessage<DownloadMessage>, ClientError> {
    Ok(SignableMessage::new(
        domain.clone(),
        DownloadMessage {
            recovering_address: wallet.recovering_address()?,
            timestamp,
            public_key: hex::encode(ephemeral_public_key.as_bytes()),
        },
    ))
}

pub fn add_address_message_to_sign(
    domain: &Domain,
    wallet: &WalletIdentity,
    address_to_add: &WalletIdentity,
    timestamp: u64,
) -> Result<SignableMessage<AddAddressMessage>, ClientError> {
    Ok(SignableMessage::new(
        domain.clone(),
        AddAddressMessage {
            recovering_address: wallet.recovering_address()?,
            address_to_add: address_to_add.recovering_address()?,
            timestamp,
        },
    ))
}

pub fn remove_address_message_to_sign(
    domain: &Domain,
    wallet: &WalletIdentity,
    address_to_remove: &WalletIdentity,
    timestamp: u64,
) -> Result<SignableMessage<RemoveAddressMessage>, ClientError> {
    Ok(SignableMessage::new(
        domain.clone(),
        RemoveAddressMessage {
            recovering_address: wallet.recovering_address()?,
            address_to_remove: address_to_remove.recovering_address()?,
            timestamp,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_crypto::{blinded_shares, generate_ephemeral_key};
    use custody_types::{AddressError, WalletType};
    use rand::rngs::OsRng;
    use std::time::Duration;

    const CONTRACT: &str = "custody.testnet";

    fn near_wallet() -> WalletIdentity {
        WalletIdentity::new(WalletType::Near, "alice.testnet")
            .with_public_key("ed25519:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp")
    }

    #[test]
    fn test_recovering_address_identical_across_messages() {
        let mut rng = OsRng;
        let domain = Domain::for_contract(CONTRACT);
        let wallet = near_wallet();
        let other = WalletIdentity::new(WalletType::Evm, "0x00000000000000000000000000000000000000Bb");
        let shares = blinded_shares(b"secret", 3, 2, &mut rng).unwrap();
        let ephemeral = generate_ephemeral_key(&mut rng);

        let upload = upload_message_to_sign(&domain, &shares, &[wallet.clone()]).unwrap();
        let download =
            download_message_to_sign(&domain, &wallet, &ephemeral.public_key(), 1).unwrap();
        let add = add_address_message_to_sign(&domain, &wallet, &other, 2).unwrap();
        let remove = remove_address_message_to_sign(&domain, &wallet, &other, 3).unwrap();

        let expected = "NEAR:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp";
        assert_eq!(upload.message.recovering_addresses[0].as_str(), expected);
        assert_eq!(download.message.recovering_address.as_str(), expected);
        assert_eq!(add.message.recovering_address.as_str(), expected);
        assert_eq!(remove.message.recovering_address.as_str(), expected);
        assert_eq!(add.message.address_to_add, remove.message.address_to_remove);
    }

    #[test]
    fn test_upload_message_carries_commitments_in_order() {
        let mut rng = OsRng;
        let domain = Domain::for_contract(CONTRACT);
        let shares = blinded_shares(b"secret", 4, 3, &mut rng).unwrap();

        let upload = upload_message_to_sign(&domain, &shares, &[near_wallet()]).unwrap();
        assert_eq!(upload.primary_type, "Upload");
        assert_eq!(upload.message.share_commitments, shares.commitment_hex());
    }

    #[test]
    fn test_upload_requires_a_recovering_address() {
        let mut rng = OsRng;
        let shares = blinded_shares(b"secret", 2, 1, &mut rng).unwrap();
        let result = upload_message_to_sign(&Domain::for_contract(CONTRACT), &shares, &[]);
        assert!(matches!(result, Err(ClientError::NoRecoveringAddress)));
    }

    #[test]
    fn test_missing_public_key_is_input_error() {
        let mut rng = OsRng;
        let wallet = WalletIdentity::new(WalletType::Xrpl, "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
        let ephemeral = generate_ephemeral_key(&mut rng);

        let result = download_message_to_sign(
            &Domain::for_contract(CONTRACT),
            &wallet,
            &ephemeral.public_key(),
            now_millis().unwrap(),
        );
        assert!(matches!(
            result,
            Err(ClientError::Address(AddressError::MissingPublicKey(WalletType::Xrpl)))
        ));
    }

    #[test]
    fn test_signing_bytes_are_deterministic() {
        let mut rng = OsRng;
        let domain = Domain::for_contract(CONTRACT);
        let ephemeral = generate_ephemeral_key(&mut rng);
        let a = download_message_to_sign(&domain, &near_wallet(), &ephemeral.public_key(), 42).unwrap();
        let b = download_message_to_sign(&domain, &near_wallet(), &ephemeral.public_key(), 42).unwrap();

        assert_eq!(a.signing_bytes().unwrap(), b.signing_bytes().unwrap());
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        let json: serde_json::Value = serde_json::from_slice(&a.signing_bytes().unwrap()).unwrap();
        assert_eq!(json["domain"]["name"], DOMAIN_NAME);
        assert_eq!(json["domain"]["verifying_contract"], CONTRACT);
        assert_eq!(json["primary_type"], "Download");
        assert_eq!(json["message"]["timestamp"], 42);
    }

    #[test]
    fn test_check_domain_rejects_other_contract_and_schema() {
        let other = WalletIdentity::new(WalletType::Evm, "0x00000000000000000000000000000000000000aa");
        let message =
            add_address_message_to_sign(&Domain::for_contract("other.testnet"), &near_wallet(), &other, 1)
                .unwrap();
        assert!(matches!(
            message.check_domain(&Domain::for_contract(CONTRACT)),
            Err(ClientError::DomainMismatch { .. })
        ));

        let mut relabelled = message.clone();
        relabelled.domain = Domain::for_contract(CONTRACT);
        relabelled.primary_type = "RemoveAddress".into();
        assert!(matches!(
            relabelled.check_domain(&Domain::for_contract(CONTRACT)),
            Err(ClientError::SchemaMismatch { expected: "AddAddress", .. })
        ));
    }

    #[test]
    fn test_clock_before_epoch_is_an_error() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert!(matches!(millis_since_epoch(before), Err(ClientError::Clock(_))));

        let later = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(millis_since_epoch(later).unwrap(), 1_700_000_000_123);
    }
}
