//! Shamir secret sharing over the BLS12-381 scalar field.
//!
//! A secret is framed as `len (u32 LE) || secret || SHA-256(secret)[..8]`
//! and cut into 31-byte chunks. Every chunk fits in one scalar and is hidden
//! behind its own random polynomial of degree t-1:
//!
//! f_c(x) = chunk_c + a_1*x + ... + a_{t-1}*x^{t-1}
//!
//! Share i (0-based) holds f_c(i + 1) for every chunk c, in chunk order.
//! Reconstruction interpolates each chunk at x = 0 and checks the frame, so
//! mixed or corrupted shares are reported instead of returning garbage.

use std::collections::BTreeMap;

use bls12_381::Scalar;
use ff::Field;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use custody_types::{sha256, SetId, Share};

use crate::error::CryptoError;

/// Secret bytes carried by one field element.
const CHUNK_LEN: usize = 31;

/// Truncated SHA-256 appended to the framed secret.
const CHECKSUM_LEN: usize = 8;

const LEN_PREFIX: usize = 4;

/// Split `secret` into `total` shares, any `threshold` of which reconstruct it.
pub fn split<R: RngCore + CryptoRng>(
    secret: &[u8],
    total: u32,
    threshold: u32,
    rng: &mut R,
) -> Result<Vec<Share>, CryptoError> {
    if threshold == 0 || threshold > total {
        return Err(CryptoError::InvalidThreshold { threshold, total });
    }

    let frame = frame_secret(secret)?;
    let chunk_count = frame.len().div_ceil(CHUNK_LEN);

    let mut set_id: SetId = [0u8; 16];
    rng.fill_bytes(&mut set_id);

    let mut shares: Vec<Share> = (0..total)
        .map(|index| Share {
            set_id,
            index,
            threshold,
            total,
            chunks: Vec::with_capacity(chunk_count),
        })
        .collect();

    for chunk in frame.chunks(CHUNK_LEN) {
        let constant = chunk_to_scalar(chunk)?;
        let coefficients = generate_polynomial(&constant, threshold as usize, rng);

        for share in shares.iter_mut() {
            let x = share_x(share.index);
            share
                .chunks
                .push(evaluate_polynomial(&coefficients, &x).to_bytes());
        }
    }

    Ok(shares)
}

/// Reconstruct a secret from at least `threshold` shares of one split.
///
/// Extra shares are accepted; the lowest-indexed `threshold` distinct shares
/// are interpolated and the result is checked against the embedded checksum.
pub fn reconstruct(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let first = shares.first().ok_or(CryptoError::InsufficientShares {
        required: 1,
        got: 0,
    })?;

    if first.threshold == 0 || first.threshold > first.total {
        return Err(CryptoError::InconsistentShares);
    }

    let mut distinct: BTreeMap<u32, &Share> = BTreeMap::new();
    for share in shares {
        if share.set_id != first.set_id
            || share.threshold != first.threshold
            || share.total != first.total
            || share.chunks.len() != first.chunks.len()
        {
            return Err(CryptoError::InconsistentShares);
        }
        if share.index >= share.total {
            return Err(CryptoError::InvalidShareIndex);
        }
        match distinct.get(&share.index) {
            Some(existing) if existing.chunks != share.chunks => {
                return Err(CryptoError::DuplicateShareIndex(share.index));
            }
            Some(_) => {}
            None => {
                distinct.insert(share.index, share);
            }
        }
    }

    let threshold = first.threshold as usize;
    if distinct.len() < threshold {
        return Err(CryptoError::InsufficientShares {
            required: threshold,
            got: distinct.len(),
        });
    }

    let selected: Vec<&Share> = distinct.values().take(threshold).copied().collect();
    interpolate(&selected)
}

/// Recover a secret from shares returned by possibly faulty holders.
///
/// Only shares of a `threshold`-of-`total` split are considered. They are
/// grouped by split, and within each group every combination of `threshold`
/// shares with distinct indices is tried until one passes the integrity
/// check. Tampered shares and shares of an older split are thereby outvoted
/// as long as `threshold` intact shares of one split are present. Larger
/// groups are tried first.
pub fn recover(
    shares: &[Share],
    threshold: u32,
    total: u32,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if threshold == 0 || threshold > total {
        return Err(CryptoError::InvalidThreshold { threshold, total });
    }
    let required = threshold as usize;

    let mut groups: BTreeMap<(SetId, usize), Vec<&Share>> = BTreeMap::new();
    for share in shares {
        if share.threshold != threshold || share.total != total || share.index >= total {
            continue;
        }
        let group = groups.entry((share.set_id, share.chunks.len())).or_default();
        if !group.iter().any(|known| known.index == share.index && known.chunks == share.chunks) {
            group.push(share);
        }
    }

    let mut groups: Vec<Vec<&Share>> = groups.into_values().collect();
    groups.sort_by_key(|group| std::cmp::Reverse(distinct_indices(group)));

    let best = groups.first().map(|group| distinct_indices(group)).unwrap_or(0);
    if best < required {
        return Err(CryptoError::InsufficientShares {
            required,
            got: best,
        });
    }

    for group in groups.iter().filter(|group| distinct_indices(group) >= required) {
        let mut combination = Combinations::new(group.len(), required);
        while let Some(picked) = combination.next_indices() {
            let selected: Vec<&Share> = picked.iter().map(|&i| group[i]).collect();
            if distinct_indices(&selected) < required {
                continue;
            }
            if let Ok(secret) = interpolate(&selected) {
                return Ok(secret);
            }
        }
    }

    Err(CryptoError::IntegrityCheckFailed)
}

fn distinct_indices(shares: &[&Share]) -> usize {
    let mut indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    indices.dedup();
    indices.len()
}

/// Lexicographic k-combinations of 0..n.
struct Combinations {
    n: usize,
    current: Vec<usize>,
    started: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            current: (0..k).collect(),
            started: false,
        }
    }

    fn next_indices(&mut self) -> Option<&[usize]> {
        let k = self.current.len();
        if k > self.n {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.current);
        }

        for i in (0..k).rev() {
            if self.current[i] < self.n - k + i {
                self.current[i] += 1;
                for j in i + 1..k {
                    self.current[j] = self.current[j - 1] + 1;
                }
                return Some(&self.current);
            }
        }
        None
    }
}

/// Interpolate every chunk at x = 0 from exactly the given shares and check
/// the frame.
fn interpolate(selected: &[&Share]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let chunk_count = selected.first().map(|s| s.chunks.len()).unwrap_or(0);
    let xs: Vec<u64> = selected.iter().map(|s| u64::from(s.index) + 1).collect();
    let lambdas = lagrange_coefficients(&xs)?;

    let mut frame = Zeroizing::new(Vec::with_capacity(chunk_count * CHUNK_LEN));
    for c in 0..chunk_count {
        let mut value = Scalar::ZERO;
        for (share, lambda) in selected.iter().zip(&lambdas) {
            let y = Option::<Scalar>::from(Scalar::from_bytes(&share.chunks[c]))
                .ok_or(CryptoError::InvalidScalar)?;
            value += y * lambda;
        }

        let bytes = value.to_bytes();
        if bytes[CHUNK_LEN] != 0 {
            return Err(CryptoError::IntegrityCheckFailed);
        }
        frame.extend_from_slice(&bytes[..CHUNK_LEN]);
    }

    unframe_secret(&frame)
}

/// Generate a random polynomial of degree t-1 with given constant term.
///
/// Returns coefficients [a_0, a_1, ..., a_{t-1}] where a_0 is the chunk.
fn generate_polynomial<R: RngCore + CryptoRng>(
    constant: &Scalar,
    degree: usize,
    rng: &mut R,
) -> Vec<Scalar> {
    let mut coefficients = Vec::with_capacity(degree);
    coefficients.push(*constant);

    for _ in 1..degree {
        let mut bytes = [0u8; 64];
        rng.fill_bytes(&mut bytes);
        coefficients.push(Scalar::from_bytes_wide(&bytes));
    }

    coefficients
}

/// Evaluate polynomial at a point using Horner's method.
fn evaluate_polynomial(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut result = Scalar::ZERO;
    for coeff in coefficients.iter().rev() {
        result = result * x + coeff;
    }
    result
}

/// Lagrange coefficients at x = 0 for the given evaluation points.
///
/// λ_i = Π_{j≠i} (x_j / (x_j - x_i))
fn lagrange_coefficients(xs: &[u64]) -> Result<Vec<Scalar>, CryptoError> {
    xs.iter()
        .map(|&i| {
            let x_i = Scalar::from(i);
            let mut numerator = Scalar::ONE;
            let mut denominator = Scalar::ONE;

            for &j in xs {
                if j == i {
                    continue;
                }
                let x_j = Scalar::from(j);
                numerator *= x_j;
                denominator *= x_j - x_i;
            }

            let inverse = Option::<Scalar>::from(denominator.invert())
                .ok_or(CryptoError::LagrangeInterpolationFailed)?;
            Ok(numerator * inverse)
        })
        .collect()
}

fn share_x(index: u32) -> Scalar {
    Scalar::from(u64::from(index) + 1)
}

fn chunk_to_scalar(chunk: &[u8]) -> Result<Scalar, CryptoError> {
    let mut bytes = [0u8; 32];
    bytes[..chunk.len()].copy_from_slice(chunk);
    // top byte stays zero, so the value is always below the field modulus
    Option::from(Scalar::from_bytes(&bytes)).ok_or(CryptoError::InvalidScalar)
}

fn frame_secret(secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let len = u32::try_from(secret.len()).map_err(|_| CryptoError::SecretTooLarge(secret.len()))?;

    let mut frame = Zeroizing::new(Vec::with_capacity(LEN_PREFIX + secret.len() + CHECKSUM_LEN));
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(secret);
    frame.extend_from_slice(&sha256(secret)[..CHECKSUM_LEN]);
    Ok(frame)
}

fn unframe_secret(frame: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let prefix: [u8; LEN_PREFIX] = frame
        .get(..LEN_PREFIX)
        .and_then(|p| p.try_into().ok())
        .ok_or(CryptoError::IntegrityCheckFailed)?;
    let len = u32::from_le_bytes(prefix) as usize;

    let secret_end = LEN_PREFIX
        .checked_add(len)
        .ok_or(CryptoError::IntegrityCheckFailed)?;
    let frame_end = secret_end + CHECKSUM_LEN;
    if frame_end > frame.len() {
        return Err(CryptoError::IntegrityCheckFailed);
    }

    let padding = &frame[frame_end..];
    if padding.len() >= CHUNK_LEN || padding.iter().any(|b| *b != 0) {
        return Err(CryptoError::IntegrityCheckFailed);
    }

    let secret = &frame[LEN_PREFIX..secret_end];
    if frame[secret_end..frame_end] != sha256(secret)[..CHECKSUM_LEN] {
        return Err(CryptoError::IntegrityCheckFailed);
    }

    Ok(Zeroizing::new(secret.to_vec()))
}
