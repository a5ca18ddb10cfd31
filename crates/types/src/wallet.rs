//! Wallet types and recovering-address canonicalization.
//!
//! Every operation against the engines names the authorizing wallet by its
//! recovering address, `<TAG>:<identifier>`. Engines match authorizations to
//! custody records by plain string equality, so a given wallet must always
//! produce the same string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while canonicalizing a wallet identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Unsupported wallet type: {0}")]
    UnsupportedWalletType(String),

    #[error("Wallet type {0} requires a public key")]
    MissingPublicKey(WalletType),

    #[error("Invalid EVM address: {0}")]
    InvalidEvmAddress(String),

    #[error("Invalid public key for {wallet}: {reason}")]
    InvalidPublicKey { wallet: WalletType, reason: String },
}

/// Wallet families that can authorize custody operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Evm,
    Near,
    Xrpl,
    Stellar,
    FaceSign,
}

impl WalletType {
    pub const ALL: [WalletType; 5] = [
        WalletType::Evm,
        WalletType::Near,
        WalletType::Xrpl,
        WalletType::Stellar,
        WalletType::FaceSign,
    ];

    /// Tag used as the recovering-address prefix and the authorization scheme.
    pub const fn tag(self) -> &'static str {
        match self {
            WalletType::Evm => "EVM",
            WalletType::Near => "NEAR",
            WalletType::Xrpl => "XRPL",
            WalletType::Stellar => "STELLAR",
            WalletType::FaceSign => "FACESIGN",
        }
    }

    /// Whether the identifier comes from the public key rather than the address.
    pub const fn requires_public_key(self) -> bool {
        !matches!(self, WalletType::Evm)
    }

    /// Canonical recovering address for a wallet of this type.
    pub fn canonicalize(
        self,
        address: &str,
        public_key: Option<&str>,
    ) -> Result<RecoveringAddress, AddressError> {
        let identifier = match self {
            WalletType::Evm => canonical_evm_address(address)?,
            WalletType::Near => {
                let key = self.public_key(public_key)?;
                let key = key.strip_prefix("ed25519:").unwrap_or(key);
                non_empty(self, key)?.to_string()
            }
            WalletType::Xrpl => {
                let key = self.public_key(public_key)?.to_ascii_lowercase();
                let key = hex_public_key(self, &key)?;
                // 33-byte ed25519 keys carry a leading 0xED type byte
                match key.strip_prefix("ed") {
                    Some(raw) if key.len() == 66 => raw.to_string(),
                    _ => key.to_string(),
                }
            }
            WalletType::Stellar => self.public_key(public_key)?.to_string(),
            WalletType::FaceSign => {
                let key = self.public_key(public_key)?.to_ascii_lowercase();
                let key = key.strip_prefix("0x").unwrap_or(key.as_str());
                hex_public_key(self, key)?.to_string()
            }
        };

        Ok(RecoveringAddress(format!("{}:{}", self.tag(), identifier)))
    }

    fn public_key(self, public_key: Option<&str>) -> Result<&str, AddressError> {
        match public_key.map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(AddressError::MissingPublicKey(self)),
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for WalletType {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" | "ethereum" | "eth" => Ok(WalletType::Evm),
            "near" => Ok(WalletType::Near),
            "xrpl" | "xrp" => Ok(WalletType::Xrpl),
            "stellar" | "xlm" => Ok(WalletType::Stellar),
            "facesign" => Ok(WalletType::FaceSign),
            other => Err(AddressError::UnsupportedWalletType(other.to_string())),
        }
    }
}

fn canonical_evm_address(address: &str) -> Result<String, AddressError> {
    let lower = address.trim().to_ascii_lowercase();
    let digits = lower
        .strip_prefix("0x")
        .ok_or_else(|| AddressError::InvalidEvmAddress(address.to_string()))?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidEvmAddress(address.to_string()));
    }
    Ok(lower)
}

fn hex_public_key(wallet: WalletType, key: &str) -> Result<&str, AddressError> {
    let key = non_empty(wallet, key)?;
    if key.len() % 2 != 0 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidPublicKey {
            wallet,
            reason: "expected hex".into(),
        });
    }
    Ok(key)
}

fn non_empty(wallet: WalletType, key: &str) -> Result<&str, AddressError> {
    if key.is_empty() {
        return Err(AddressError::MissingPublicKey(wallet));
    }
    Ok(key)
}

/// Canonical, wallet-type-tagged identifier of an authorizing wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveringAddress(String);

impl RecoveringAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wallet type named by the address prefix, if recognised.
    pub fn wallet_type(&self) -> Option<WalletType> {
        let (tag, _) = self.0.split_once(':')?;
        WalletType::ALL.into_iter().find(|w| w.tag() == tag)
    }
}

impl fmt::Display for RecoveringAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wallet as presented by the signing layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub wallet_type: WalletType,
    pub address: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl WalletIdentity {
    pub fn new(wallet_type: WalletType, address: impl Into<String>) -> Self {
        Self {
            wallet_type,
            address: address.into(),
            public_key: None,
        }
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn recovering_address(&self) -> Result<RecoveringAddress, AddressError> {
        self.wallet_type
            .canonicalize(&self.address, self.public_key.as_deref())
    }
}
