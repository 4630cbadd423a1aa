use crate::*;

use bytes::Bytes;
use weft_core::envelope::{seal, PlainEnvelope};
use weft_core::schema::Packet;
use weft_mesh::{AlertKind, MeshEvent};

/// A node that never declared a namespace does not receive its traffic,
/// while a node that did receives it.
#[tokio::test]
async fn interest_declarations_filter_fanout() {
    let hub = MemoryHub::new();
    let sender = spawn_node(&hub, "weft-send0001", |_| {}).await;
    let interested = spawn_node(&hub, "weft-want0001", |_| {}).await;
    let indifferent = spawn_node(&hub, "weft-meh00001", |c| {
        c.mesh.interests = Vec::new(); // implicit namespaces only
    })
    .await;
    connect_all(&[&sender, &interested, &indifferent]).await;
    settle().await;

    sender.notes().save(Some("n1"), "title", "body").await.unwrap();
    settle().await;

    assert_eq!(interested.notes().list().await.unwrap().len(), 1);
    assert!(indifferent.notes().list().await.unwrap().is_empty());
}

/// Raising an interest later re-handshakes and opens the tap.
#[tokio::test]
async fn late_interest_starts_receiving() {
    let hub = MemoryHub::new();
    let sender = spawn_node(&hub, "weft-send0002", |_| {}).await;
    let listener = spawn_node(&hub, "weft-late0002", |c| {
        c.mesh.interests = Vec::new();
    })
    .await;
    connect(&sender, &listener).await;
    settle().await;

    sender.notes().save(Some("early"), "t", "b").await.unwrap();
    settle().await;
    assert!(listener.notes().list().await.unwrap().is_empty());

    listener
        .controller()
        .add_interest(weft_core::schema::namespace::NOTES)
        .await;
    settle().await;

    sender.notes().save(Some("later"), "t", "b").await.unwrap();
    settle().await;
    let notes = listener.notes().list().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, "later");
}

/// A frame sealed with the wrong mesh key is dropped with an alert,
/// never delivered to services.
#[tokio::test]
async fn wrong_key_frame_raises_security_alert() {
    let hub = MemoryHub::new();
    let key = weft_core::SymmetricKey::generate();
    let key_b64 = key.to_base64();
    let victim = spawn_node(&hub, "weft-good0003", |c| {
        c.mesh.mesh_key = key_b64;
    })
    .await;
    let intruder = spawn_node(&hub, "weft-evil0003", |c| {
        c.mesh.mesh_key = weft_core::SymmetricKey::generate().to_base64();
    })
    .await;
    connect(&victim, &intruder).await;
    settle().await;

    let mut sub = victim.controller().subscribe();
    intruder.notes().save(Some("n"), "t", "b").await.unwrap();
    settle().await;

    let mut alerted = false;
    while let Some(event) = sub.try_recv() {
        if let MeshEvent::SecurityAlert { peer, kind } = event {
            assert_eq!(peer, "weft-evil0003");
            assert_eq!(kind, AlertKind::UndecryptableFrame);
            alerted = true;
        }
    }
    assert!(alerted, "expected an undecryptable-frame alert");
    assert!(victim.notes().list().await.unwrap().is_empty());
}

/// A signed envelope whose payload was modified in flight fails
/// verification and raises a bad-signature alert.
#[tokio::test]
async fn tampered_signed_frame_raises_security_alert() {
    let hub = MemoryHub::new();
    let victim = spawn_node(&hub, "weft-good0004", |_| {}).await;
    let (attacker, _rx) = hub.attach("weft-mitm0004");
    victim.controller().on_peer_open("weft-mitm0004").await;
    settle().await;

    let forger = IdentityKeypair::generate();
    let plain = PlainEnvelope::new(
        3,
        namespace::GLOBAL,
        Packet::AssetRequest { path: "/x".into() },
    );
    let bytes = seal(plain, Some(&forger), None).unwrap();
    let mut frame: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    frame["payload"]["clock"] = 99.into();

    let mut sub = victim.controller().subscribe();
    use weft_mesh::Transport;
    attacker
        .send(
            "weft-good0004",
            Bytes::from(serde_json::to_vec(&frame).unwrap()),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        sub.try_recv(),
        Some(MeshEvent::SecurityAlert {
            peer: "weft-mitm0004".into(),
            kind: AlertKind::BadSignature,
        })
    );
}

/// A pioneer pins every accepted payload under its content hash for
/// later redistribution; ordinary nodes pin nothing.
#[tokio::test]
async fn pioneer_pins_accepted_payloads() {
    let hub = MemoryHub::new();
    let pioneer = spawn_node(&hub, "weft-pin00007", |c| c.mesh.pioneer = true).await;
    let peer = spawn_node(&hub, "weft-pin00008", |_| {}).await;
    connect(&pioneer, &peer).await;
    settle().await;

    peer.social().publish("hello mesh").await.unwrap();
    peer.increment_counter().await.unwrap();
    settle().await;

    let pinned = pioneer.store().keys_with_prefix("pin/").await.unwrap();
    assert_eq!(pinned.len(), 2);
    let peer_pins = peer.store().keys_with_prefix("pin/").await.unwrap();
    assert!(peer_pins.is_empty());
}

/// Receiving a frame advances the local Lamport clock past the sender's.
#[tokio::test]
async fn lamport_clock_merges_on_receive() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-clk00005", |_| {}).await;
    let b = spawn_node(&hub, "weft-clk00006", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    for _ in 0..20 {
        a.controller().tick();
    }
    let before_send = a.controller().clock_now();
    a.social().publish("advancing the clock").await.unwrap();
    settle().await;

    assert!(b.controller().clock_now() > before_send);
}
