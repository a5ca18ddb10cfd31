//! Share blinding and commitments.
//!
//! Blinding prepends 32 random bytes to a serialized share so stored shares
//! differ on every upload. It is an obfuscation step only: unblinding is a
//! fixed-offset strip and needs no key.

use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use custody_types::{sha256, Share, ShareCommitment, BLINDING_LEN};

use crate::error::CryptoError;
use crate::shamir;

/// Prepend fresh randomness to a serialized share.
pub fn blind<R: RngCore + CryptoRng>(share: &[u8], rng: &mut R) -> Vec<u8> {
    let mut blinded = vec![0u8; BLINDING_LEN + share.len()];
    rng.fill_bytes(&mut blinded[..BLINDING_LEN]);
    blinded[BLINDING_LEN..].copy_from_slice(share);
    blinded
}

/// Strip the blinding prefix.
pub fn unblind(blinded: &[u8]) -> Result<&[u8], CryptoError> {
    blinded
        .get(BLINDING_LEN..)
        .ok_or(CryptoError::BlindedShareTooShort)
}

/// Commitment an engine can later be held to for the bytes it stores.
pub fn commit(blinded: &[u8]) -> ShareCommitment {
    ShareCommitment(sha256(blinded))
}

pub fn encode_share(share: &Share) -> Result<Vec<u8>, CryptoError> {
    borsh::to_vec(share).map_err(|e| CryptoError::SerializationError(e.to_string()))
}

pub fn decode_share(bytes: &[u8]) -> Result<Share, CryptoError> {
    borsh::from_slice(bytes).map_err(|e| CryptoError::SerializationError(e.to_string()))
}

/// Blinded shares of one secret, ready for upload, in engine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindedShareSet {
    pub shares: Vec<Vec<u8>>,
    pub commitments: Vec<ShareCommitment>,
    pub threshold: u32,
}

impl BlindedShareSet {
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Commitments in the hex form used by upload messages.
    pub fn commitment_hex(&self) -> Vec<String> {
        self.commitments.iter().map(ShareCommitment::to_hex).collect()
    }
}

impl Drop for BlindedShareSet {
    fn drop(&mut self) {
        for share in self.shares.iter_mut() {
            share.zeroize();
        }
    }
}

/// Split, serialize, blind and commit to a secret.
///
/// The blinding prefixes are not kept anywhere once this returns.
pub fn blinded_shares<R: RngCore + CryptoRng>(
    secret: &[u8],
    total: u32,
    threshold: u32,
    rng: &mut R,
) -> Result<BlindedShareSet, CryptoError> {
    let shares = shamir::split(secret, total, threshold, rng)?;

    let mut blinded = Vec::with_capacity(shares.len());
    let mut commitments = Vec::with_capacity(shares.len());
    for share in &shares {
        let mut encoded = encode_share(share)?;
        let share_bytes = blind(&encoded, rng);
        encoded.zeroize();

        commitments.push(commit(&share_bytes));
        blinded.push(share_bytes);
    }

    Ok(BlindedShareSet {
        shares: blinded,
        commitments,
        threshold,
    })
}
