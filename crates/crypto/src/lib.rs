//! Cryptographic primitives for threshold secret custody.
//!
//! # Overview
//!
//! 1. **Split**: the secret is shared with Shamir's scheme over the BLS12-381
//!    scalar field. Any `t` of `n` shares reconstruct it, fewer reveal nothing.
//!
//! 2. **Blind**: each serialized share gets 32 random bytes prepended and is
//!    committed to with SHA-256 before upload.
//!
//! 3. **Transport**: engines return shares sealed in a NaCl box to an
//!    ephemeral X25519 key chosen by the client for that download.
//!
//! 4. **Reconstruct**: the client opens each box, strips the blinding and
//!    interpolates the secret back from any `t` consistent shares.

pub mod blind;
pub mod error;
pub mod sealed;
pub mod shamir;

pub use blind::{blind, blinded_shares, commit, decode_share, encode_share, unblind, BlindedShareSet};
pub use error::CryptoError;
pub use sealed::{generate_ephemeral_key, open, seal, SealedShare};
pub use shamir::{reconstruct, recover, split};

pub use crypto_box::{PublicKey as BoxPublicKey, SecretKey as BoxSecretKey};
