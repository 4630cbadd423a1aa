//! In-memory transport hub and store, for tests and single-process meshes.
//!
//! The hub is a switchboard: each attached node gets a transport handle
//! for sending and a receiver of `(from, frame)` pairs for inbound
//! traffic. The caller pumps that receiver into its controller's
//! `on_data`, which mirrors how a network driver would.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::store::{KvStore, StoreError};
use crate::transport::{Transport, TransportError};

type Inbound = mpsc::UnboundedReceiver<(String, Bytes)>;

/// A process-local mesh fabric.
#[derive(Clone, Default)]
pub struct MemoryHub {
    nodes: Arc<DashMap<String, mpsc::UnboundedSender<(String, Bytes)>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node. Returns its transport handle and inbound frame feed.
    pub fn attach(&self, id: &str) -> (MemoryTransport, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.insert(id.to_string(), tx);
        (
            MemoryTransport {
                id: id.to_string(),
                nodes: self.nodes.clone(),
            },
            rx,
        )
    }

    /// Remove a node; frames sent to it afterwards fail as unreachable.
    pub fn detach(&self, id: &str) {
        self.nodes.remove(id);
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|e| e.key().clone()).collect()
    }
}

/// One node's sending handle into a [`MemoryHub`].
pub struct MemoryTransport {
    id: String,
    nodes: Arc<DashMap<String, mpsc::UnboundedSender<(String, Bytes)>>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, remote: &str, frame: Bytes) -> Result<(), TransportError> {
        let tx = self
            .nodes
            .get(remote)
            .ok_or_else(|| TransportError::PeerUnreachable(remote.to_string()))?;
        tx.send((self.id.clone(), frame))
            .map_err(|_| TransportError::PeerUnreachable(remote.to_string()))
    }
}

/// BTree-backed store. Prefix scans come for free from key ordering.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend("store mutex poisoned".into())
}
