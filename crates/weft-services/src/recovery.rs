//! Social identity recovery.
//!
//! A node scatters its identity to three guardians: the identity record
//! is sealed with a fresh recovery key, and the key is Shamir-split 2-of-3
//! so each guardian holds one share plus the sealed identity. No single
//! guardian can read it; any two can resurrect it.
//!
//! Resurrection: broadcast a request for the owner id, guardians answer
//! with their shards (unicast, straight back to the requester), and once
//! two distinct shares arrive the key reconstructs and the identity
//! decrypts.
//!
//! Store layout:
//!   vault/{owner_id}/{shard_index} → RecoveryShard

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use weft_core::crypto::{CryptoError, SymmetricKey};
use weft_core::schema::{namespace, IdentityRecord, Packet, RecoveryShard, SealedBlob};
use weft_core::shamir::{self, ReconstructionError, Share, ShareError};
use weft_mesh::{KvStore, KvStoreExt, MeshController, MeshError, MeshEvent, StoreError};

pub const GUARDIAN_COUNT: u8 = 3;
pub const GUARDIAN_THRESHOLD: u8 = 2;

pub struct RecoveryEngine {
    controller: Arc<MeshController>,
    store: Arc<dyn KvStore>,
}

impl RecoveryEngine {
    pub fn new(controller: Arc<MeshController>, store: Arc<dyn KvStore>) -> Self {
        Self { controller, store }
    }

    /// Seal `record` under a fresh recovery key and hand one key share
    /// plus the sealed identity to each of exactly three guardians.
    pub async fn designate_guardians(
        &self,
        record: &IdentityRecord,
        guardians: &[String],
    ) -> Result<(), RecoveryError> {
        if guardians.len() != GUARDIAN_COUNT as usize {
            return Err(RecoveryError::GuardianCount {
                got: guardians.len(),
            });
        }

        let recovery_key = SymmetricKey::generate();
        let plaintext =
            serde_json::to_vec(record).map_err(|e| RecoveryError::Corrupt(e.to_string()))?;
        let (cipher, iv) = recovery_key.encrypt(&plaintext)?;
        let sealed = SealedBlob { cipher, iv };

        let shares = shamir::split(
            recovery_key.to_base64().as_bytes(),
            GUARDIAN_COUNT,
            GUARDIAN_THRESHOLD,
        )?;
        for (guardian, share) in guardians.iter().zip(shares) {
            let shard = RecoveryShard {
                owner_id: record.peer_id.clone(),
                shard_index: share.x,
                shard_data: share.to_base64(),
                encrypted_identity: sealed.clone(),
            };
            if let Err(e) = self
                .controller
                .send_to(
                    guardian,
                    namespace::RECOVERY,
                    Packet::RecoveryShardOffer {
                        target: guardian.clone(),
                        shard,
                    },
                )
                .await
            {
                warn!(guardian = guardian.as_str(), error = %e, "shard offer failed");
            }
        }
        info!(owner = record.peer_id.as_str(), "guardians designated");
        Ok(())
    }

    /// Accept a shard offered to this node and vault it.
    pub async fn on_shard_offer(
        &self,
        target: &str,
        shard: RecoveryShard,
    ) -> Result<(), RecoveryError> {
        if target != self.controller.local_id() {
            return Ok(());
        }
        let key = vault_key(&shard.owner_id, shard.shard_index);
        self.store.put_as(&key, &shard).await?;
        debug!(
            owner = shard.owner_id.as_str(),
            index = shard.shard_index,
            "recovery shard vaulted"
        );
        Ok(())
    }

    /// Answer a resurrection request with every shard we vault for the
    /// owner, unicast to the requester.
    pub async fn on_resurrection_request(
        &self,
        owner_id: &str,
        requester: &str,
    ) -> Result<(), RecoveryError> {
        let prefix = format!("vault/{owner_id}/");
        for key in self.store.keys_with_prefix(&prefix).await? {
            let Some(shard) = self.store.get_as::<RecoveryShard>(&key).await? else {
                continue;
            };
            debug!(
                owner = owner_id,
                requester,
                index = shard.shard_index,
                "answering resurrection request"
            );
            if let Err(e) = self
                .controller
                .send_to(
                    requester,
                    namespace::RECOVERY,
                    Packet::ResurrectionResponse { shard },
                )
                .await
            {
                warn!(requester, error = %e, "resurrection response failed");
            }
        }
        Ok(())
    }

    /// Ask the mesh for the owner's shards and rebuild the identity once
    /// a threshold of distinct shares has arrived.
    pub async fn resurrect(
        &self,
        owner_id: &str,
        wait: Duration,
    ) -> Result<IdentityRecord, RecoveryError> {
        let mut sub = self.controller.subscribe();
        self.controller
            .broadcast(
                namespace::RECOVERY,
                Packet::ResurrectionRequest {
                    owner_id: owner_id.to_string(),
                },
            )
            .await?;

        let collect = async {
            let mut shards: Vec<RecoveryShard> = Vec::new();
            while let Some(event) = sub.recv().await {
                let MeshEvent::DataReceived { envelope, .. } = event else {
                    continue;
                };
                let Packet::ResurrectionResponse { shard } = envelope.packet else {
                    continue;
                };
                if shard.owner_id != owner_id
                    || shards.iter().any(|s| s.shard_index == shard.shard_index)
                {
                    continue;
                }
                shards.push(shard);
                if shards.len() >= GUARDIAN_THRESHOLD as usize {
                    return Some(shards);
                }
            }
            None
        };
        let shards = timeout(wait, collect)
            .await
            .ok()
            .flatten()
            .ok_or(RecoveryError::Timeout)?;

        recover_identity(&shards)
    }
}

/// Rebuild the identity from a threshold of shards. Pure, so ceremony
/// transcripts can be replayed offline.
pub fn recover_identity(shards: &[RecoveryShard]) -> Result<IdentityRecord, RecoveryError> {
    let shares = shards
        .iter()
        .map(|s| Share::from_base64(&s.shard_data))
        .collect::<Result<Vec<_>, _>>()?;
    let key_b64 = String::from_utf8(shamir::reconstruct(&shares)?)
        .map_err(|_| RecoveryError::Corrupt("recovery key is not utf-8".into()))?;
    let recovery_key = SymmetricKey::from_base64(&key_b64)?;

    let sealed = &shards
        .first()
        .ok_or(RecoveryError::Timeout)?
        .encrypted_identity;
    let plaintext = recovery_key.decrypt(&sealed.cipher, &sealed.iv)?;
    serde_json::from_slice(&plaintext).map_err(|e| RecoveryError::Corrupt(e.to_string()))
}

fn vault_key(owner_id: &str, index: u8) -> String {
    format!("vault/{owner_id}/{index}")
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("exactly {GUARDIAN_COUNT} guardians required, got {got}")]
    GuardianCount { got: usize },

    #[error("no threshold of shards arrived in time")]
    Timeout,

    #[error("recovered material is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}
