//! weft-core — protocol primitives shared by every weft crate.
//!
//! Crypto provider, canonical signing encoding, Shamir secret sharing,
//! the LWW counter CRDT, the wire schema, the layered envelope codec,
//! and configuration. All other weft crates depend on this one.

pub mod canonical;
pub mod config;
pub mod counter;
pub mod crypto;
pub mod envelope;
pub mod schema;
pub mod shamir;

pub use config::{ConfigError, MeshConfig};
pub use counter::{CounterUpdate, LwwCounter};
pub use crypto::{CryptoError, IdentityKeypair, SymmetricKey};
pub use envelope::{EncryptedEnvelope, EnvelopeError, Frame, PlainEnvelope, SignedEnvelope};
pub use schema::Packet;
