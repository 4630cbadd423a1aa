//! Weft integration test harness.
//!
//! Tests run whole nodes against an in-memory hub: real controllers,
//! real envelopes and signatures, real dispatch loops — only the
//! transport is process-local. Each test builds its own hub, so tests
//! never interfere with each other.

mod economy;
mod files;
mod mesh;
mod recovery;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use weft_core::config::MeshConfig;
use weft_core::crypto::IdentityKeypair;
use weft_core::schema::namespace;
use weft_mesh::{KvStore, MemoryHub, MemoryStore};
use weft_services::MeshCore;

// ── Harness ───────────────────────────────────────────────────────────────────

/// All service namespaces, so a default test node receives everything.
pub fn all_interests() -> Vec<String> {
    [
        namespace::ECONOMY,
        namespace::RECOVERY,
        namespace::MEDIA,
        namespace::SOCIAL,
        namespace::NOTES,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Spawn a started node on the hub, with a driver task pumping inbound
/// frames into the controller.
pub async fn spawn_node(
    hub: &MemoryHub,
    id: &str,
    mutate: impl FnOnce(&mut MeshConfig),
) -> Arc<MeshCore> {
    let (transport, mut rx) = hub.attach(id);
    let mut config = MeshConfig::default();
    config.mesh.interests = all_interests();
    config.mesh.asset_timeout_ms = 500;
    mutate(&mut config);

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let core = MeshCore::new(
        config,
        Arc::new(transport),
        store,
        Arc::new(IdentityKeypair::generate()),
    )
    .expect("node construction");
    core.start();

    let pump = core.controller().clone();
    tokio::spawn(async move {
        while let Some((from, frame)) = rx.recv().await {
            pump.on_data(&from, &frame).await;
        }
    });
    core
}

/// Open the channel in both directions, as a connected transport would.
pub async fn connect(a: &Arc<MeshCore>, b: &Arc<MeshCore>) {
    a.controller().on_peer_open(b.local_id()).await;
    b.controller().on_peer_open(a.local_id()).await;
}

/// Connect every pair.
pub async fn connect_all(nodes: &[&Arc<MeshCore>]) {
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            connect(a, b).await;
        }
    }
}

/// Let in-flight frames and dispatch loops drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(120)).await;
}

// ── Smoke ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn nodes_connect_and_exchange_handshakes() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-aaaa0001", |_| {}).await;
    let b = spawn_node(&hub, "weft-bbbb0001", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    assert_eq!(a.controller().peer_count(), 1);
    assert_eq!(b.controller().peer_count(), 1);
    assert_eq!(
        a.controller().open_peers(),
        vec!["weft-bbbb0001".to_string()]
    );
}

#[tokio::test]
async fn disconnect_empties_the_connection_table() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-aaaa0002", |_| {}).await;
    let b = spawn_node(&hub, "weft-bbbb0002", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    a.controller().on_peer_close(b.local_id());
    assert_eq!(a.controller().peer_count(), 0);
}
