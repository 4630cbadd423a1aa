//! Wire schema — the closed set of packets that travel inside envelopes.
//!
//! Every payload on the mesh is one `Packet` variant, tagged by a
//! SCREAMING_SNAKE `type` field. The tag set IS the protocol: an unknown
//! tag fails decode and the mesh drops the message with a diagnostic —
//! there is no substring matching on loosely-shaped payloads.
//!
//! Binary fields (ciphertexts, signatures, IVs) travel as base64 strings
//! so the whole wire format stays JSON.

use serde::{Deserialize, Serialize};

use crate::counter::CounterUpdate;
use crate::crypto::IV_LEN;

// ── Namespaces ────────────────────────────────────────────────────────────────

/// Wire-level routing tags for interest-based fan-out. Case-sensitive.
pub mod namespace {
    /// Wildcard — every node is implicitly interested.
    pub const GLOBAL: &str = "GLOBAL";
    /// Core protocol traffic: counter updates, version announcements.
    pub const CORE: &str = "WEFT_CORE";
    /// Witnessed credit economy.
    pub const ECONOMY: &str = "WEFT_ECONOMY";
    /// Social identity recovery ceremony.
    pub const RECOVERY: &str = "WEFT_RECOVERY";
    /// File manifests and shards.
    pub const MEDIA: &str = "WEFT_MEDIA";
    /// Social posts.
    pub const SOCIAL: &str = "WEFT_SOCIAL";
    /// Synced notes.
    pub const NOTES: &str = "WEFT_NOTES";

    /// Interests every node declares regardless of configuration.
    pub const IMPLICIT: [&str; 2] = [GLOBAL, CORE];
}

// ── Base64 serde helpers ──────────────────────────────────────────────────────

pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

pub mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        match text {
            Some(t) => STANDARD
                .decode(&t)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

pub mod b64_iv {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::crypto::IV_LEN;

    pub fn serialize<S: Serializer>(iv: &[u8; IV_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(iv))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; IV_LEN], D::Error> {
        let text = String::deserialize(d)?;
        let raw = STANDARD.decode(&text).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("iv must be 12 bytes"))
    }
}

// ── Ids ───────────────────────────────────────────────────────────────────────

/// Content-addressed id: hex BLAKE3 of the bytes.
pub fn content_id(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Random 16-hex-char id for transactions and posts.
pub fn random_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Contribution categories ───────────────────────────────────────────────────

/// Recognized contribution categories for the witness allow-list.
///
/// Reasons travel as `"KIND:detail"` strings; a reason whose KIND does not
/// parse into this closed set is rejected by every witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionKind {
    /// Served an application asset to a bootstrapping peer.
    AssetSeed,
    /// Stored and re-served file shards.
    ShardStore,
    /// Performed compute on behalf of the mesh.
    Compute,
    /// Relayed traffic between partitioned peers.
    Relay,
}

impl ContributionKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "ASSET_SEED" => Some(Self::AssetSeed),
            "SHARD_STORE" => Some(Self::ShardStore),
            "COMPUTE" => Some(Self::Compute),
            "RELAY" => Some(Self::Relay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssetSeed => "ASSET_SEED",
            Self::ShardStore => "SHARD_STORE",
            Self::Compute => "COMPUTE",
            Self::Relay => "RELAY",
        }
    }

    /// Build a `"KIND:detail"` reason string.
    pub fn reason(&self, detail: &str) -> String {
        format!("{}:{}", self.as_str(), detail)
    }
}

/// Split a reason string into its recognized category and detail.
/// Returns `None` for unrecognized categories.
pub fn parse_reason(reason: &str) -> Option<(ContributionKind, &str)> {
    let (tag, detail) = reason.split_once(':')?;
    ContributionKind::parse(tag).map(|kind| (kind, detail))
}

// ── Domain records ────────────────────────────────────────────────────────────

/// An AEAD-sealed blob: ciphertext plus the nonce that sealed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    #[serde(with = "b64")]
    pub cipher: Vec<u8>,
    #[serde(with = "b64_iv")]
    pub iv: [u8; IV_LEN],
}

/// Authority record for a shredded file: shard count and the exported
/// symmetric key used for every shard. Shards are meaningless without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub shard_count: u32,
    pub encryption_key: String,
}

/// One encrypted fragment of a shredded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShard {
    pub index: u32,
    #[serde(with = "b64")]
    pub cipher: Vec<u8>,
    #[serde(with = "b64_iv")]
    pub iv: [u8; IV_LEN],
}

/// A value transfer. Mutates only by accumulating attestations until
/// quorum; finalized awards are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub reason: String,
    pub timestamp: u64,
    #[serde(default, with = "b64_opt")]
    pub signature: Option<Vec<u8>>,
    #[serde(default)]
    pub attestations: Vec<WitnessAttestation>,
}

/// The exact view a proposer signs when requesting witnesses: the
/// transaction minus signature and attestations. Protocol constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalClaim {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub reason: String,
    pub timestamp: u64,
}

impl ProposalClaim {
    pub fn of(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.clone(),
            from: tx.from.clone(),
            to: tx.to.clone(),
            amount: tx.amount,
            reason: tx.reason.clone(),
            timestamp: tx.timestamp,
        }
    }
}

/// A witness's signed corroboration. The signature covers exactly
/// [`AttestationClaim`] — nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessAttestation {
    pub tx_id: String,
    pub witness: String,
    pub witness_public_key: String,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

/// The exact view a witness signs. Protocol constant — changing the shape
/// invalidates every attestation on the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationClaim {
    pub tx_id: String,
    pub witness: String,
}

/// One guardian's piece of a scattered identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryShard {
    pub owner_id: String,
    pub shard_index: u8,
    /// Base64-packed Shamir share of the recovery key.
    pub shard_data: String,
    /// The full identity, sealed with the recovery key.
    pub encrypted_identity: SealedBlob,
}

/// The identity material protected by recovery: enough to come back as
/// the same node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub peer_id: String,
    /// Base64 Ed25519 secret key bytes.
    pub secret_key: String,
}

/// Build fingerprint announced by pioneer nodes so peers can sync the
/// application bundle from the mesh instead of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: String,
    pub build_hash: String,
    pub timestamp: u64,
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub timestamp: u64,
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// The closed tagged union of everything that travels on the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Packet {
    /// Interest exchange, sent immediately on connection open and on every
    /// interest change. Always a plain frame.
    InterestHandshake { interests: Vec<String> },
    AssetRequest {
        path: String,
    },
    AssetResponse {
        path: String,
        #[serde(with = "b64")]
        data: Vec<u8>,
        content_type: Option<String>,
    },
    FileManifest {
        manifest: FileManifest,
    },
    FileShard {
        file_id: String,
        shard: FileShard,
    },
    WitnessRequest {
        tx: CreditTransaction,
    },
    WitnessAttestation {
        attestation: WitnessAttestation,
    },
    CreditAward {
        tx: CreditTransaction,
    },
    RecoveryShardOffer {
        target: String,
        shard: RecoveryShard,
    },
    ResurrectionRequest {
        owner_id: String,
    },
    ResurrectionResponse {
        shard: RecoveryShard,
    },
    CounterUpdate {
        update: CounterUpdate,
    },
    VersionAnnounce {
        manifest: BuildManifest,
    },
    SocialPost {
        post: SocialPost,
    },
    NoteSaved {
        note: Note,
    },
    NoteDeleted {
        note_id: String,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
