//! Key-value persistence contract.
//!
//! Services persist JSON values under string keys with prefix scans for
//! enumeration (`credit/`, `vault/`, `asset/`). The backend is injected;
//! services never reach for storage directly.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// All keys starting with `prefix`, in lexical order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Typed convenience layer over the JSON contract.
#[async_trait]
pub trait KvStoreExt: KvStore {
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(StoreError::Codec),
            None => Ok(None),
        }
    }

    async fn put_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(StoreError::Codec)?;
        self.put(key, value).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("stored value failed to decode: {0}")]
    Codec(#[source] serde_json::Error),
}
