//! Public-key authenticated encryption for shares returned by engines.
//!
//! Engines seal the stored (blinded) share to the ephemeral X25519 key named
//! in the download request, using a NaCl box (X25519 + XSalsa20-Poly1305).

use crypto_box::aead::{Aead, AeadCore, Nonce};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// A box produced by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedShare {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub sender_public_key: [u8; KEY_LEN],
}

/// Fresh keypair for one download.
pub fn generate_ephemeral_key<R: RngCore + CryptoRng>(rng: &mut R) -> SecretKey {
    SecretKey::generate(rng)
}

pub fn public_key_hex(secret: &SecretKey) -> String {
    hex::encode(secret.public_key().as_bytes())
}

pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let raw: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len())))?;
    Ok(PublicKey::from(raw))
}

pub fn public_key_from_hex(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(encoded.trim_start_matches("0x"))
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    public_key_from_bytes(&bytes)
}

pub fn secret_key_from_hex(encoded: &str) -> Result<SecretKey, CryptoError> {
    let bytes = Zeroizing::new(
        hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
    );
    let raw: [u8; KEY_LEN] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes")))?;
    Ok(SecretKey::from(raw))
}

/// Seal `plaintext` from `sender` to `recipient`.
pub fn seal<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient: &PublicKey,
    sender: &SecretKey,
    rng: &mut R,
) -> Result<SealedShare, CryptoError> {
    let salsa_box = SalsaBox::new(recipient, sender);
    let nonce = SalsaBox::generate_nonce(rng);
    let ciphertext = salsa_box
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(nonce.as_slice());

    Ok(SealedShare {
        ciphertext,
        nonce: nonce_bytes,
        sender_public_key: *sender.public_key().as_bytes(),
    })
}

/// Open a box sealed by `sender_public_key` to `recipient`.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8],
    sender_public_key: &[u8],
    recipient: &SecretKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonce(nonce.len()));
    }
    let sender = public_key_from_bytes(sender_public_key)?;

    let salsa_box = SalsaBox::new(&sender, recipient);
    let plaintext = salsa_box
        .decrypt(Nonce::<SalsaBox>::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_seal_and_open() {
        let mut rng = OsRng;
        let engine = generate_ephemeral_key(&mut rng);
        let requester = generate_ephemeral_key(&mut rng);

        let sealed = seal(b"blinded share", &requester.public_key(), &engine, &mut rng).unwrap();
        let opened = open(
            &sealed.ciphertext,
            &sealed.nonce,
            &sealed.sender_public_key,
            &requester,
        )
        .unwrap();
        assert_eq!(opened.as_slice(), b"blinded share");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let mut rng = OsRng;
        let engine = generate_ephemeral_key(&mut rng);
        let requester = generate_ephemeral_key(&mut rng);
        let stranger = generate_ephemeral_key(&mut rng);

        let sealed = seal(b"blinded share", &requester.public_key(), &engine, &mut rng).unwrap();
        let result = open(
            &sealed.ciphertext,
            &sealed.nonce,
            &sealed.sender_public_key,
            &stranger,
        );
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_open_rejects_bad_nonce_length() {
        let mut rng = OsRng;
        let requester = generate_ephemeral_key(&mut rng);
        let result = open(&[0u8; 40], &[0u8; 12], &[0u8; 32], &requester);
        assert_eq!(result, Err(CryptoError::InvalidNonce(12)));
    }

    #[test]
    fn test_key_hex_roundtrip() {
        let mut rng = OsRng;
        let key = generate_ephemeral_key(&mut rng);
        let encoded = hex::encode(key.to_bytes());
        let decoded = secret_key_from_hex(&encoded).unwrap();
        assert_eq!(public_key_hex(&decoded), public_key_hex(&key));

        let public = public_key_from_hex(&public_key_hex(&key)).unwrap();
        assert_eq!(public, key.public_key());
    }
}
