//! Version announcement and asset seeding.
//!
//! Pioneer nodes carry the application bundle. They seed it into the
//! asset cache, announce a build manifest, and serve cached assets to
//! peers that ask. Non-pioneers compare announced manifests against
//! their cache and pull whatever is missing over the mesh.
//!
//! Serving an asset is a rewardable contribution: the server reports it
//! on the event bus and the witness flow takes it from there.
//!
//! Store layout:
//!   asset/{path}      → CachedAsset
//!   seed/{content_id} → seeded marker
//!   version/manifest  → BuildManifest (latest seen)

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use weft_core::schema::{b64, content_id, namespace, BuildManifest, ContributionKind, Packet};
use weft_mesh::{KvStore, KvStoreExt, MeshController, MeshError, MeshEvent, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAsset {
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

pub struct VersionService {
    controller: Arc<MeshController>,
    store: Arc<dyn KvStore>,
    announce_assets: bool,
    asset_reward: f64,
}

impl VersionService {
    pub fn new(
        controller: Arc<MeshController>,
        store: Arc<dyn KvStore>,
        announce_assets: bool,
        asset_reward: f64,
    ) -> Self {
        Self {
            controller,
            store,
            announce_assets,
            asset_reward,
        }
    }

    /// Seed the application bundle into the cache and record a manifest.
    /// Seeding is idempotent per content hash — rebooting a pioneer does
    /// not rewrite an unchanged bundle.
    pub async fn seed_assets(
        &self,
        version: &str,
        assets: &[(String, Vec<u8>, Option<String>)],
    ) -> Result<BuildManifest, VersionError> {
        let mut hashes = Vec::with_capacity(assets.len());
        for (path, data, content_type) in assets {
            let hash = content_id(data);
            hashes.extend_from_slice(hash.as_bytes());
            let marker = format!("seed/{hash}");
            if self.store.get(&marker).await?.is_some() {
                continue;
            }
            self.store
                .put_as(
                    &asset_key(path),
                    &CachedAsset {
                        data: data.clone(),
                        content_type: content_type.clone(),
                    },
                )
                .await?;
            self.store.put(&marker, serde_json::Value::Bool(true)).await?;
            debug!(path = path.as_str(), "asset seeded");
        }

        let manifest = BuildManifest {
            version: version.to_string(),
            build_hash: content_id(&hashes),
            timestamp: now_millis(),
            assets: assets.iter().map(|(path, _, _)| path.clone()).collect(),
        };
        self.store.put_as("version/manifest", &manifest).await?;
        info!(version, hash = manifest.build_hash.as_str(), "bundle seeded");
        Ok(manifest)
    }

    /// Broadcast the latest manifest so peers can sync.
    pub async fn announce(&self) -> Result<(), VersionError> {
        let Some(manifest) = self.store.get_as::<BuildManifest>("version/manifest").await? else {
            return Ok(());
        };
        self.controller
            .broadcast(namespace::CORE, Packet::VersionAnnounce { manifest })
            .await?;
        Ok(())
    }

    /// Record an announced manifest if it is newer than what we hold,
    /// then pull any assets we are missing. Returns how many we fetched.
    pub async fn on_announce(&self, manifest: BuildManifest) -> Result<usize, VersionError> {
        if let Some(known) = self.store.get_as::<BuildManifest>("version/manifest").await? {
            if known.build_hash == manifest.build_hash || known.timestamp >= manifest.timestamp {
                return Ok(0);
            }
        }
        self.store.put_as("version/manifest", &manifest).await?;
        info!(
            version = manifest.version.as_str(),
            "new build announced, syncing"
        );

        let mut fetched = 0;
        for path in &manifest.assets {
            if self.store.get(&asset_key(path)).await?.is_some() {
                continue;
            }
            match self.controller.request_asset(path).await {
                Some((data, content_type)) => {
                    self.store
                        .put_as(&asset_key(path), &CachedAsset { data, content_type })
                        .await?;
                    fetched += 1;
                }
                None => warn!(path = path.as_str(), "asset unavailable on the mesh"),
            }
        }
        Ok(fetched)
    }

    /// Serve one cached asset to a requesting peer, reporting the
    /// contribution for the witness flow to reward.
    pub async fn on_asset_request(&self, from: &str, path: &str) -> Result<(), VersionError> {
        if !self.announce_assets {
            return Ok(());
        }
        let Some(asset) = self.store.get_as::<CachedAsset>(&asset_key(path)).await? else {
            return Ok(());
        };
        self.controller
            .send_to(
                from,
                namespace::GLOBAL,
                Packet::AssetResponse {
                    path: path.to_string(),
                    data: asset.data,
                    content_type: asset.content_type,
                },
            )
            .await?;
        self.controller.events().publish(MeshEvent::ContributionDetected {
            to: self.controller.local_id().to_string(),
            amount: self.asset_reward,
            reason: ContributionKind::AssetSeed.reason(path),
        });
        Ok(())
    }

    pub async fn cached_asset(&self, path: &str) -> Result<Option<CachedAsset>, VersionError> {
        Ok(self.store.get_as(&asset_key(path)).await?)
    }
}

fn asset_key(path: &str) -> String {
    format!("asset/{path}")
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}
