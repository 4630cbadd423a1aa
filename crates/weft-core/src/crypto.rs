//! Cryptographic primitives for weft.
//!
//! Provides two things:
//!   1. AES-256-GCM symmetric encryption — mesh privacy, file shards,
//!      recovery key sealing. Fresh random 96-bit nonce per call.
//!   2. Ed25519 identity signing — envelope signatures, witness
//!      attestations. Signing hashes canonical bytes (see `canonical`),
//!      so signer and verifier always agree on the message.
//!
//! Secret key material derives ZeroizeOnDrop — wiped from memory when
//! dropped. There is no unsafe code in this module.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::canonical::canonical_bytes;

/// AEAD nonce length in bytes (96 bits, per AES-GCM).
pub const IV_LEN: usize = 12;

// ── Symmetric key ─────────────────────────────────────────────────────────────

/// A 256-bit AES-GCM key shared out-of-band across the mesh.
///
/// The raw bytes never leave this struct except through `to_base64`,
/// which exists precisely for out-of-band sharing.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Export as base64 for out-of-band sharing.
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    /// Import a key previously exported with `to_base64`.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = B64
            .decode(encoded)
            .map_err(|_| CryptoError::KeyImport("invalid base64".into()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::KeyImport("key must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    /// Encrypt `plaintext`, returning the ciphertext (payload + 16-byte tag)
    /// and the fresh nonce used. Nonces are random per call and never reused.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN]), CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| CryptoError::KeyImport("bad key length".into()))?;
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let ct = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::Encryption)?;
        Ok((ct, iv))
    }

    /// Decrypt a ciphertext produced by `encrypt`.
    ///
    /// Fails on a tampered or truncated ciphertext or a wrong key —
    /// garbage is never returned.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8; IV_LEN]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| CryptoError::KeyImport("bad key length".into()))?;
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// A node's long-term Ed25519 identity.
///
/// Generated once on first boot and persisted externally. The public key
/// travels in every signed envelope; the secret key never leaves this
/// struct except through `secret_bytes` for persistence.
pub struct IdentityKeypair {
    signing: SigningKey,
}

impl IdentityKeypair {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing }
    }

    /// Reconstruct an identity from stored secret key bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    /// Serialize the secret key for persistent storage.
    /// The public key is always derived on load.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// Base64 public key as it appears inside signed envelopes.
    pub fn public_base64(&self) -> String {
        B64.encode(self.signing.verifying_key().to_bytes())
    }

    /// Sign the canonical encoding of `value`. Returns a 64-byte signature.
    pub fn sign_canonical<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CryptoError> {
        let bytes = canonical_bytes(value).map_err(CryptoError::Canonical)?;
        Ok(self.signing.sign(&bytes).to_vec())
    }
}

/// Verify `signature` over the canonical encoding of `value` against a
/// base64 public key.
///
/// Returns `false` — never an error — on a malformed key, malformed
/// signature, or failed verification. Callers drop the message and move on.
pub fn verify_canonical<T: Serialize>(value: &T, signature: &[u8], public_b64: &str) -> bool {
    let key = match import_public(public_b64) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = match Signature::from_slice(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let bytes = match canonical_bytes(value) {
        Ok(b) => b,
        Err(_) => return false,
    };
    key.verify_strict(&bytes, &sig).is_ok()
}

/// Import a base64 Ed25519 public key.
pub fn import_public(public_b64: &str) -> Result<VerifyingKey, CryptoError> {
    let raw = B64
        .decode(public_b64)
        .map_err(|_| CryptoError::KeyImport("invalid base64 public key".into()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| CryptoError::KeyImport("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| CryptoError::KeyImport("not a valid Ed25519 point".into()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key import failed: {0}")]
    KeyImport(String),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: wrong key or tampered ciphertext")]
    Decryption,

    #[error("canonical serialization failed: {0}")]
    Canonical(#[source] serde_json::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
