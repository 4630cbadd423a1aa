//! Shamir secret sharing over GF(2^8).
//!
//! Field arithmetic uses the reduction polynomial x^8 + x^4 + x^3 + x + 1
//! (0x11B); addition is XOR; the multiplicative inverse comes from Fermat's
//! little theorem (a^254 = a^-1, since a^255 = 1 for a != 0).
//!
//! Each byte of the secret is split independently: a random polynomial of
//! degree k-1 with the secret byte as its constant term is evaluated at
//! x = share index + 1 (x is never 0 — the polynomial at 0 IS the secret).
//! Reconstruction is Lagrange interpolation at x = 0 from any k shares.
//! Fewer than k shares reveal nothing about the secret.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::RngCore;
use thiserror::Error;

// ── Field arithmetic ──────────────────────────────────────────────────────────

/// Multiply in GF(2^8), reducing by 0x11B.
fn gf_mul(a: u8, b: u8) -> u8 {
    let mut result: u16 = 0;
    let mut aa = a as u16;
    let mut bb = b as u16;
    while bb > 0 {
        if bb & 1 != 0 {
            result ^= aa;
        }
        aa <<= 1;
        if aa & 0x100 != 0 {
            aa ^= 0x11B;
        }
        bb >>= 1;
    }
    result as u8
}

/// Multiplicative inverse via a^254. Caller guarantees a != 0.
fn gf_inv(a: u8) -> u8 {
    // Square-and-multiply: six rounds of (square, multiply) take the
    // exponent to 127, a final square lands on 254.
    let mut result = a;
    for _ in 0..6 {
        result = gf_mul(result, result);
        result = gf_mul(result, a);
    }
    gf_mul(result, result)
}

/// Evaluate a polynomial (coefficients low-to-high) at x.
fn poly_eval(coeffs: &[u8], x: u8) -> u8 {
    let mut y = 0u8;
    let mut x_pow = 1u8;
    for &c in coeffs {
        y ^= gf_mul(c, x_pow);
        x_pow = gf_mul(x_pow, x);
    }
    y
}

// ── Shares ────────────────────────────────────────────────────────────────────

/// One share of a split secret.
///
/// `x` is the evaluation coordinate (1-based, never 0); `threshold` is the
/// k required to reconstruct; `data` holds one evaluated byte per secret
/// byte. Base64 packing for transport: `[x, threshold, data...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub x: u8,
    pub threshold: u8,
    pub data: Vec<u8>,
}

impl Share {
    /// Pack for transport inside a recovery shard.
    pub fn to_base64(&self) -> String {
        let mut packed = Vec::with_capacity(2 + self.data.len());
        packed.push(self.x);
        packed.push(self.threshold);
        packed.extend_from_slice(&self.data);
        B64.encode(packed)
    }

    /// Unpack a share produced by `to_base64`.
    pub fn from_base64(encoded: &str) -> Result<Self, ShareError> {
        let packed = B64.decode(encoded).map_err(|_| ShareError::Malformed)?;
        if packed.len() < 2 {
            return Err(ShareError::Malformed);
        }
        if packed[0] == 0 {
            return Err(ShareError::ZeroCoordinate);
        }
        Ok(Self {
            x: packed[0],
            threshold: packed[1],
            data: packed[2..].to_vec(),
        })
    }
}

/// Split `secret` into `n` shares, any `k` of which reconstruct it.
pub fn split(secret: &[u8], n: u8, k: u8) -> Result<Vec<Share>, ShareError> {
    if k == 0 || n == 0 || k > n {
        return Err(ShareError::BadParameters { n, k });
    }
    let mut shares: Vec<Share> = (1..=n)
        .map(|x| Share {
            x,
            threshold: k,
            data: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut rng = rand::thread_rng();
    let mut coeffs = vec![0u8; k as usize];
    for &byte in secret {
        coeffs[0] = byte;
        rng.fill_bytes(&mut coeffs[1..]);
        for share in &mut shares {
            share.data.push(poly_eval(&coeffs, share.x));
        }
    }
    Ok(shares)
}

/// Reconstruct the secret from at least `threshold` shares.
///
/// Shares must agree on threshold and length and carry distinct
/// x-coordinates; extra shares beyond the threshold are ignored.
pub fn reconstruct(shares: &[Share]) -> Result<Vec<u8>, ReconstructionError> {
    let first = shares.first().ok_or(ReconstructionError::TooFewShares {
        needed: 1,
        got: 0,
    })?;
    let k = first.threshold as usize;
    if shares.len() < k {
        return Err(ReconstructionError::TooFewShares {
            needed: k,
            got: shares.len(),
        });
    }
    let picked = &shares[..k];
    for share in picked {
        if share.threshold != first.threshold {
            return Err(ReconstructionError::ThresholdMismatch);
        }
        if share.data.len() != first.data.len() {
            return Err(ReconstructionError::LengthMismatch);
        }
    }
    for (i, a) in picked.iter().enumerate() {
        for b in &picked[i + 1..] {
            if a.x == b.x {
                return Err(ReconstructionError::DuplicateCoordinate(a.x));
            }
        }
    }

    // Lagrange interpolation at x = 0, byte position by byte position.
    // In GF(2^8) subtraction is XOR, so (0 - x_j) = x_j.
    let mut secret = vec![0u8; first.data.len()];
    for (pos, out) in secret.iter_mut().enumerate() {
        let mut acc = 0u8;
        for (i, share_i) in picked.iter().enumerate() {
            let mut basis = share_i.data[pos];
            for (j, share_j) in picked.iter().enumerate() {
                if i == j {
                    continue;
                }
                basis = gf_mul(basis, gf_mul(share_j.x, gf_inv(share_i.x ^ share_j.x)));
            }
            acc ^= basis;
        }
        *out = acc;
    }
    Ok(secret)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("invalid split parameters: n={n}, k={k}")]
    BadParameters { n: u8, k: u8 },

    #[error("malformed share encoding")]
    Malformed,

    #[error("share carries x-coordinate 0")]
    ZeroCoordinate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("need {needed} shares to reconstruct, got {got}")]
    TooFewShares { needed: usize, got: usize },

    #[error("shares carry duplicate x-coordinate {0}")]
    DuplicateCoordinate(u8),

    #[error("shares disagree on secret length")]
    LengthMismatch,

    #[error("shares disagree on threshold")]
    ThresholdMismatch,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
