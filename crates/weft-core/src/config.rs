//! Configuration system for weft.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WEFT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/weft/config.toml
//!   3. ~/.config/weft/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub identity: IdentityConfig,
    pub mesh: MeshSection,
    pub economy: EconomyConfig,
    pub sharding: ShardingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the Ed25519 secret key. Auto-generated on first run.
    pub keypair_path: PathBuf,
    /// Human-readable display name attached to social posts.
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSection {
    /// Application swarm id. Peer ids are `{app_id}-{8 hex}`.
    pub app_id: String,
    /// Namespaces this node subscribes to, beyond the implicit set.
    pub interests: Vec<String>,
    /// Base64 mesh key. Empty = unencrypted mesh.
    pub mesh_key: String,
    /// Pioneer nodes seed the application bundle and announce versions.
    pub pioneer: bool,
    /// How long an asset request waits before giving up, in milliseconds.
    pub asset_timeout_ms: u64,
    /// Serve cached assets to requesting peers.
    pub announce_assets: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Balance granted to a peer the first time it appears.
    pub genesis_balance: f64,
    /// Reward for serving one asset to a bootstrapping peer.
    pub asset_reward: f64,
    /// Pending awards older than this are swept away, in milliseconds.
    pub pending_award_ttl_ms: u64,
    /// Sweep cadence for expired pending awards, in milliseconds.
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Plaintext bytes per shard before encryption.
    pub shard_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            mesh: MeshSection::default(),
            economy: EconomyConfig::default(),
            sharding: ShardingConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            keypair_path: config_dir().join("keypair"),
            display_name: String::new(),
        }
    }
}

impl Default for MeshSection {
    fn default() -> Self {
        Self {
            app_id: "weft".to_string(),
            interests: Vec::new(),
            mesh_key: String::new(),
            pioneer: false,
            asset_timeout_ms: 5_000,
            announce_assets: true,
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            genesis_balance: 100.0,
            asset_reward: 0.05,
            pending_award_ttl_ms: 60_000,
            sweep_interval_ms: 15_000,
        }
    }
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            shard_size: 262_144, // 256 KiB
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("weft")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MeshConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WEFT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeshConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply WEFT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEFT_MESH__APP_ID") {
            self.mesh.app_id = v;
        }
        if let Ok(v) = std::env::var("WEFT_MESH__INTERESTS") {
            self.mesh.interests = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("WEFT_MESH__MESH_KEY") {
            self.mesh.mesh_key = v;
        }
        if let Ok(v) = std::env::var("WEFT_MESH__PIONEER") {
            self.mesh.pioneer = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("WEFT_MESH__ASSET_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.mesh.asset_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("WEFT_ECONOMY__GENESIS_BALANCE") {
            if let Ok(b) = v.parse() {
                self.economy.genesis_balance = b;
            }
        }
        if let Ok(v) = std::env::var("WEFT_SHARDING__SHARD_SIZE") {
            if let Ok(s) = v.parse() {
                self.sharding.shard_size = s;
            }
        }
        if let Ok(v) = std::env::var("WEFT_IDENTITY__DISPLAY_NAME") {
            self.identity.display_name = v;
        }
    }
}
