//! Envelope layering for mesh frames.
//!
//! A packet travels inside up to three nested layers:
//!
//!   plain  →  signed (adds sender key + signature over the plain layer)
//!          →  encrypted (AES-GCM over the signed/plain JSON, outermost)
//!
//! Encryption is always the outermost layer: a node that lacks the mesh
//! key learns nothing, not even the sender. Decoding peeks at marker
//! fields (`encrypted`, then `signature`) to pick the layer, so the three
//! shapes coexist on one wire.
//!
//! Interest handshakes are deliberately sent as plain frames even on an
//! encrypted mesh — peers must be able to negotiate interests before
//! proving they hold the key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::canonical_bytes;
use crate::crypto::{verify_canonical, CryptoError, IdentityKeypair, SymmetricKey, IV_LEN};
use crate::schema::{b64, b64_iv, Packet};

// ── Layers ────────────────────────────────────────────────────────────────────

/// Innermost layer: Lamport clock, routing namespace, and the packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainEnvelope {
    pub clock: u64,
    pub namespace: String,
    #[serde(flatten)]
    pub packet: Packet,
}

impl PlainEnvelope {
    pub fn new(clock: u64, namespace: &str, packet: Packet) -> Self {
        Self {
            clock,
            namespace: namespace.to_string(),
            packet,
        }
    }
}

/// A plain envelope plus the sender's public key and a signature over the
/// canonical encoding of the plain envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: PlainEnvelope,
    /// Base64 Ed25519 public key of the signer.
    pub sender: String,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// Outermost layer: the signed/plain JSON sealed with the mesh key.
/// The `encrypted` marker is what decode peeks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub encrypted: bool,
    #[serde(with = "b64")]
    pub cipher: Vec<u8>,
    #[serde(with = "b64_iv")]
    pub iv: [u8; IV_LEN],
}

/// One decoded wire frame, whichever layer arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Plain(PlainEnvelope),
    Signed(SignedEnvelope),
    Encrypted(EncryptedEnvelope),
}

impl Frame {
    /// Decode one frame from wire bytes, picking the layer by marker field.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)?;
        let obj = value
            .as_object()
            .ok_or(EnvelopeError::NotAnObject)?;
        if obj.contains_key("encrypted") {
            let env = serde_json::from_value(value).map_err(EnvelopeError::Malformed)?;
            Ok(Frame::Encrypted(env))
        } else if obj.contains_key("signature") {
            let env = serde_json::from_value(value).map_err(EnvelopeError::Malformed)?;
            Ok(Frame::Signed(env))
        } else {
            let env = serde_json::from_value(value).map_err(EnvelopeError::Malformed)?;
            Ok(Frame::Plain(env))
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let bytes = match self {
            Frame::Plain(env) => serde_json::to_vec(env),
            Frame::Signed(env) => serde_json::to_vec(env),
            Frame::Encrypted(env) => serde_json::to_vec(env),
        };
        bytes.map_err(EnvelopeError::Malformed)
    }
}

// ── Seal / open ───────────────────────────────────────────────────────────────

/// Wrap a plain envelope for the wire: sign if an identity is given,
/// then encrypt if a mesh key is given. Either layer alone is valid.
pub fn seal(
    plain: PlainEnvelope,
    identity: Option<&IdentityKeypair>,
    key: Option<&SymmetricKey>,
) -> Result<Vec<u8>, EnvelopeError> {
    let inner = match identity {
        Some(id) => {
            let signature = id.sign_canonical(&plain)?;
            Frame::Signed(SignedEnvelope {
                payload: plain,
                sender: id.public_base64(),
                signature,
            })
        }
        None => Frame::Plain(plain),
    };
    match key {
        Some(key) => {
            let inner_bytes = inner.encode()?;
            let (cipher, iv) = key.encrypt(&inner_bytes)?;
            Frame::Encrypted(EncryptedEnvelope {
                encrypted: true,
                cipher,
                iv,
            })
            .encode()
        }
        None => inner.encode(),
    }
}

/// Unwrap wire bytes down to the plain envelope.
///
/// Returns the envelope and, when the sender signed it, their verified
/// public key. An invalid signature is an error, not a missing key —
/// callers raise a security alert rather than processing the frame.
pub fn open(
    bytes: &[u8],
    key: Option<&SymmetricKey>,
) -> Result<(PlainEnvelope, Option<String>), EnvelopeError> {
    let frame = match Frame::decode(bytes)? {
        Frame::Encrypted(env) => {
            let key = key.ok_or(EnvelopeError::MissingKey)?;
            let inner = key
                .decrypt(&env.cipher, &env.iv)
                .map_err(|_| EnvelopeError::Decryption)?;
            let inner_frame = Frame::decode(&inner)?;
            if matches!(inner_frame, Frame::Encrypted(_)) {
                return Err(EnvelopeError::NestedEncryption);
            }
            inner_frame
        }
        other => other,
    };
    match frame {
        Frame::Plain(env) => Ok((env, None)),
        Frame::Signed(env) => {
            if !verify_canonical(&env.payload, &env.signature, &env.sender) {
                return Err(EnvelopeError::SignatureInvalid);
            }
            Ok((env.payload, Some(env.sender)))
        }
        Frame::Encrypted(_) => unreachable!("stripped above"),
    }
}

/// Canonical bytes a signer commits to for a plain envelope. Exposed for
/// tests and external attestation flows.
pub fn signing_bytes(plain: &PlainEnvelope) -> Result<Vec<u8>, EnvelopeError> {
    canonical_bytes(plain).map_err(EnvelopeError::Malformed)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame is encrypted but no mesh key is configured")]
    MissingKey,

    #[error("decryption failed: wrong mesh key or tampered frame")]
    Decryption,

    #[error("envelope signature does not verify")]
    SignatureInvalid,

    #[error("encrypted frame nested inside an encrypted frame")]
    NestedEncryption,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
