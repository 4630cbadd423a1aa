//! File sharding: shred a file into fixed-size encrypted shards and put
//! it back together.
//!
//! Every shard of a file is sealed with one fresh symmetric key, exported
//! into the manifest. The manifest is the authority: shard count, sizes,
//! and the key all come from it, so shards scattered across the mesh are
//! useless to anyone who never saw the manifest.

use thiserror::Error;

use weft_core::crypto::{CryptoError, SymmetricKey};
use weft_core::schema::{content_id, FileManifest, FileShard};

pub struct ShardingManager {
    shard_size: usize,
}

impl ShardingManager {
    pub fn new(shard_size: usize) -> Self {
        Self { shard_size }
    }

    /// Split `bytes` into encrypted shards plus the manifest that binds
    /// them. Empty files produce zero shards and still assemble.
    pub fn shred(
        &self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<(FileManifest, Vec<FileShard>), ShardError> {
        let key = SymmetricKey::generate();
        let mut shards = Vec::with_capacity(bytes.len().div_ceil(self.shard_size));
        for (index, chunk) in bytes.chunks(self.shard_size).enumerate() {
            let (cipher, iv) = key.encrypt(chunk)?;
            shards.push(FileShard {
                index: index as u32,
                cipher,
                iv,
            });
        }
        let manifest = FileManifest {
            id: content_id(bytes),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            shard_count: shards.len() as u32,
            encryption_key: key.to_base64(),
        };
        Ok((manifest, shards))
    }

    /// Reassemble a file from its manifest and shards, in any order.
    ///
    /// Fails naming the first missing index, so callers know exactly what
    /// to re-fetch from the mesh.
    pub fn assemble(
        &self,
        manifest: &FileManifest,
        shards: &[FileShard],
    ) -> Result<Vec<u8>, ShardError> {
        let key = SymmetricKey::from_base64(&manifest.encryption_key)?;

        let mut by_index: Vec<Option<&FileShard>> = vec![None; manifest.shard_count as usize];
        for shard in shards {
            let slot = by_index
                .get_mut(shard.index as usize)
                .ok_or(ShardError::UnexpectedShard { index: shard.index })?;
            if slot.is_some() {
                return Err(ShardError::DuplicateShard { index: shard.index });
            }
            *slot = Some(shard);
        }
        if let Some(missing) = by_index.iter().position(|s| s.is_none()) {
            return Err(ShardError::MissingShard {
                index: missing as u32,
            });
        }

        let mut bytes = Vec::with_capacity(manifest.size as usize);
        for shard in by_index.into_iter().flatten() {
            bytes.extend(key.decrypt(&shard.cipher, &shard.iv)?);
        }
        if content_id(&bytes) != manifest.id || bytes.len() as u64 != manifest.size {
            return Err(ShardError::IntegrityMismatch);
        }
        Ok(bytes)
    }
}

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("shard {index} is missing")]
    MissingShard { index: u32 },

    #[error("shard {index} appears more than once")]
    DuplicateShard { index: u32 },

    #[error("shard {index} is beyond the manifest's shard count")]
    UnexpectedShard { index: u32 },

    #[error("assembled bytes do not match the manifest")]
    IntegrityMismatch,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
