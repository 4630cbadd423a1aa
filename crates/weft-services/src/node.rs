//! MeshCore — one node, fully wired.
//!
//! Takes a transport, a store, and an identity by injection, builds the
//! controller and every service on top, and runs the dispatch loop that
//! routes decoded packets to service handlers by packet type. Handler
//! failures are logged and never tear down the loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use weft_core::canonical::canonical_bytes;
use weft_core::config::MeshConfig;
use weft_core::counter::LwwCounter;
use weft_core::crypto::{IdentityKeypair, SymmetricKey};
use weft_core::envelope::PlainEnvelope;
use weft_core::schema::{
    content_id, namespace, random_id, FileManifest, FileShard, IdentityRecord, Packet,
};
use weft_mesh::{
    KvStore, KvStoreExt, MeshController, MeshEvent, Subscription, Transport,
};

use crate::credit::{CreditLedger, MINT};
use crate::notes::NotesService;
use crate::recovery::RecoveryEngine;
use crate::sharding::ShardingManager;
use crate::social::SocialFeed;
use crate::version::VersionService;
use crate::witness::WitnessEngine;

/// Mint a peer id for a swarm: `{app_id}-{8 hex}`.
pub fn generate_peer_id(app_id: &str) -> String {
    format!("{app_id}-{}", &random_id()[..8])
}

pub struct MeshCore {
    config: MeshConfig,
    controller: Arc<MeshController>,
    store: Arc<dyn KvStore>,
    identity: Arc<IdentityKeypair>,
    ledger: Arc<CreditLedger>,
    witness: Arc<WitnessEngine>,
    recovery: Arc<RecoveryEngine>,
    version: Arc<VersionService>,
    social: Arc<SocialFeed>,
    notes: Arc<NotesService>,
    sharding: ShardingManager,
    counter: Mutex<LwwCounter>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshCore {
    pub fn new(
        config: MeshConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KvStore>,
        identity: Arc<IdentityKeypair>,
    ) -> Result<Arc<Self>> {
        let mesh_key = if config.mesh.mesh_key.is_empty() {
            None
        } else {
            Some(
                SymmetricKey::from_base64(&config.mesh.mesh_key)
                    .context("mesh key in config is invalid")?,
            )
        };

        let controller = Arc::new(MeshController::new(
            transport,
            identity.clone(),
            mesh_key,
            config.mesh.interests.clone(),
            Duration::from_millis(config.mesh.asset_timeout_ms),
        ));
        let ledger = Arc::new(CreditLedger::new(
            store.clone(),
            config.economy.genesis_balance,
        ));
        let witness = Arc::new(WitnessEngine::new(
            controller.clone(),
            identity.clone(),
            ledger.clone(),
            config.mesh.pioneer,
            config.economy.pending_award_ttl_ms,
        ));
        let recovery = Arc::new(RecoveryEngine::new(controller.clone(), store.clone()));
        let version = Arc::new(VersionService::new(
            controller.clone(),
            store.clone(),
            config.mesh.announce_assets,
            config.economy.asset_reward,
        ));
        let social = Arc::new(SocialFeed::new(
            controller.clone(),
            store.clone(),
            config.identity.display_name.clone(),
        ));
        let notes = Arc::new(NotesService::new(controller.clone(), store.clone()));
        let sharding = ShardingManager::new(config.sharding.shard_size);

        Ok(Arc::new(Self {
            config,
            controller,
            store,
            identity,
            ledger,
            witness,
            recovery,
            version,
            social,
            notes,
            sharding,
            counter: Mutex::new(LwwCounter::default()),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the dispatch loop and the pending-award sweeper.
    pub fn start(self: &Arc<Self>) {
        let sub = self.controller.subscribe();
        let node = self.clone();
        let dispatch = tokio::spawn(async move { node.dispatch(sub).await });

        let witness = self.witness.clone();
        let sweep_interval = Duration::from_millis(self.config.economy.sweep_interval_ms);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                witness.sweep_expired();
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(dispatch);
            tasks.push(sweeper);
        }
        info!(
            peer = self.controller.local_id(),
            pioneer = self.config.mesh.pioneer,
            "node started"
        );
    }

    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn controller(&self) -> &Arc<MeshController> {
        &self.controller
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn witness(&self) -> &Arc<WitnessEngine> {
        &self.witness
    }

    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    pub fn version(&self) -> &Arc<VersionService> {
        &self.version
    }

    pub fn social(&self) -> &Arc<SocialFeed> {
        &self.social
    }

    pub fn notes(&self) -> &Arc<NotesService> {
        &self.notes
    }

    pub fn local_id(&self) -> &str {
        self.controller.local_id()
    }

    pub fn is_pioneer(&self) -> bool {
        self.config.mesh.pioneer
    }

    /// This node's identity material, as scattered to guardians.
    pub fn identity_record(&self) -> IdentityRecord {
        IdentityRecord {
            peer_id: self.local_id().to_string(),
            secret_key: B64.encode(*self.identity.secret_bytes()),
        }
    }

    pub async fn balance(&self, peer: &str) -> Result<f64> {
        Ok(self.ledger.balance(peer).await?)
    }

    // ── Counter ───────────────────────────────────────────────────────────

    /// Bump the shared counter and broadcast the delta.
    pub async fn increment_counter(&self) -> Result<i64> {
        let update = {
            let mut counter = self
                .counter
                .lock()
                .map_err(|_| anyhow::anyhow!("counter mutex poisoned"))?;
            counter.increment(self.controller.local_id())
        };
        let value = update.value;
        self.controller
            .broadcast(namespace::CORE, Packet::CounterUpdate { update })
            .await?;
        Ok(value)
    }

    pub fn counter_value(&self) -> i64 {
        self.counter.lock().map(|c| c.value()).unwrap_or_default()
    }

    // ── Files ─────────────────────────────────────────────────────────────

    /// Shred a file, keep a local copy of everything, and scatter the
    /// manifest and shards across the media namespace.
    pub async fn share_file(&self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<String> {
        let (manifest, shards) = self.sharding.shred(name, mime_type, bytes)?;
        let id = manifest.id.clone();
        self.store
            .put_as(&manifest_key(&id), &manifest)
            .await?;
        for shard in &shards {
            self.store
                .put_as(&shard_key(&id, shard.index), shard)
                .await?;
        }

        self.controller
            .broadcast(
                namespace::MEDIA,
                Packet::FileManifest {
                    manifest: manifest.clone(),
                },
            )
            .await?;
        for shard in shards {
            self.controller
                .broadcast(
                    namespace::MEDIA,
                    Packet::FileShard {
                        file_id: id.clone(),
                        shard,
                    },
                )
                .await?;
        }
        info!(file = id.as_str(), name, "file shared");
        Ok(id)
    }

    /// Reassemble a file from locally held shards. Fails naming the
    /// first missing shard if the mesh has not delivered them all yet.
    pub async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let manifest: FileManifest = self
            .store
            .get_as(&manifest_key(file_id))
            .await?
            .with_context(|| format!("no manifest for file {file_id}"))?;
        let mut shards = Vec::with_capacity(manifest.shard_count as usize);
        for key in self
            .store
            .keys_with_prefix(&format!("shard/{file_id}/"))
            .await?
        {
            if let Some(shard) = self.store.get_as::<FileShard>(&key).await? {
                shards.push(shard);
            }
        }
        Ok(self.sharding.assemble(&manifest, &shards)?)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    async fn dispatch(self: Arc<Self>, mut sub: Subscription) {
        while let Some(event) = sub.recv().await {
            match event {
                MeshEvent::DataReceived { from, envelope, sender_key } => {
                    self.route(&from, envelope, sender_key).await;
                }
                MeshEvent::ContributionDetected { to, amount, reason } => {
                    if let Err(e) = self.witness.propose(MINT, &to, amount, &reason).await {
                        warn!(to = to.as_str(), error = %e, "contribution proposal failed");
                    }
                }
                _ => {}
            }
        }
    }

    async fn route(&self, from: &str, envelope: PlainEnvelope, sender_key: Option<String>) {
        // Pioneers pin every accepted payload for redistribution.
        if self.is_pioneer() {
            if let Err(e) = self.pin_payload(&envelope.packet).await {
                warn!(peer = from, error = %e, "pioneer pin failed");
            }
        }
        let result: Result<()> = match envelope.packet {
            Packet::CounterUpdate { update } => {
                if let Ok(mut counter) = self.counter.lock() {
                    counter.merge(&update);
                }
                Ok(())
            }
            Packet::WitnessRequest { tx } => {
                self.witness.on_request(tx, sender_key).await;
                Ok(())
            }
            Packet::WitnessAttestation { attestation } => {
                self.witness.on_attestation(attestation).await;
                Ok(())
            }
            Packet::CreditAward { tx } => {
                self.witness.on_award(tx).await;
                Ok(())
            }
            Packet::RecoveryShardOffer { target, shard } => self
                .recovery
                .on_shard_offer(&target, shard)
                .await
                .map_err(Into::into),
            Packet::ResurrectionRequest { owner_id } => self
                .recovery
                .on_resurrection_request(&owner_id, from)
                .await
                .map_err(Into::into),
            // Collected by whichever resurrect() call is waiting.
            Packet::ResurrectionResponse { .. } => Ok(()),
            Packet::AssetRequest { path } => self
                .version
                .on_asset_request(from, &path)
                .await
                .map_err(Into::into),
            // Collected by whichever request_asset() call is waiting.
            Packet::AssetResponse { .. } => Ok(()),
            Packet::VersionAnnounce { manifest } => self
                .version
                .on_announce(manifest)
                .await
                .map(|_| ())
                .map_err(Into::into),
            Packet::FileManifest { manifest } => self
                .store
                .put_as(&manifest_key(&manifest.id), &manifest)
                .await
                .map_err(Into::into),
            Packet::FileShard { file_id, shard } => self
                .store
                .put_as(&shard_key(&file_id, shard.index), &shard)
                .await
                .map_err(Into::into),
            Packet::SocialPost { post } => self.social.on_post(post).await.map_err(Into::into),
            Packet::NoteSaved { note } => self.notes.on_saved(note).await.map_err(Into::into),
            Packet::NoteDeleted { note_id } => {
                self.notes.on_deleted(&note_id).await.map_err(Into::into)
            }
            // Handshakes never leave the controller.
            Packet::InterestHandshake { .. } => Ok(()),
        };
        if let Err(e) = result {
            warn!(peer = from, error = %e, "packet handling failed");
        }
    }

    /// Persist one accepted payload under its content hash. Keying by
    /// content makes re-delivery idempotent.
    async fn pin_payload(&self, packet: &Packet) -> Result<()> {
        let key = format!("pin/{}", content_id(&canonical_bytes(packet)?));
        if self.store.get(&key).await?.is_none() {
            self.store.put(&key, serde_json::to_value(packet)?).await?;
        }
        Ok(())
    }
}

fn manifest_key(id: &str) -> String {
    format!("manifest/{id}")
}

fn shard_key(file_id: &str, index: u32) -> String {
    format!("shard/{file_id}/{index:05}")
}
