use crate::*;

/// Share a file on one node and reassemble it on another after the
/// manifest and shards propagate over the media namespace.
#[tokio::test]
async fn shared_file_reassembles_on_a_peer() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-file0001", |c| c.sharding.shard_size = 16).await;
    let b = spawn_node(&hub, "weft-file0002", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    let payload: Vec<u8> = (0..200u8).collect();
    let file_id = a.share_file("data.bin", "application/octet-stream", &payload)
        .await
        .unwrap();
    settle().await;

    assert_eq!(b.fetch_file(&file_id).await.unwrap(), payload);
}

/// A peer missing one shard fails with the exact index, so it knows
/// what to re-request.
#[tokio::test]
async fn missing_shard_is_named_precisely() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-file0003", |c| c.sharding.shard_size = 16).await;
    let b = spawn_node(&hub, "weft-file0004", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    let payload = vec![9u8; 64]; // four shards
    let file_id = a.share_file("data.bin", "bin", &payload).await.unwrap();
    settle().await;

    let shard_keys = b
        .store()
        .keys_with_prefix(&format!("shard/{file_id}/"))
        .await
        .unwrap();
    assert_eq!(shard_keys.len(), 4);
    b.store().delete(&shard_keys[1]).await.unwrap();

    let err = b.fetch_file(&file_id).await.unwrap_err();
    assert!(err.to_string().contains("shard 1 is missing"));
}

/// Asset requests resolve from a seeded peer and time out cleanly when
/// nobody holds the asset.
#[tokio::test]
async fn asset_requests_resolve_or_time_out() {
    let hub = MemoryHub::new();
    let pioneer = spawn_node(&hub, "weft-pion0005", |c| c.mesh.pioneer = true).await;
    let peer = spawn_node(&hub, "weft-peer0005", |_| {}).await;
    connect(&pioneer, &peer).await;
    settle().await;

    pioneer
        .version()
        .seed_assets(
            "1.0.0",
            &[(
                "/index.html".to_string(),
                b"<html/>".to_vec(),
                Some("text/html".to_string()),
            )],
        )
        .await
        .unwrap();

    let (data, content_type) = peer.controller().request_asset("/index.html").await.unwrap();
    assert_eq!(data, b"<html/>");
    assert_eq!(content_type.as_deref(), Some("text/html"));

    assert!(peer.controller().request_asset("/absent.css").await.is_none());
}

/// A version announcement pulls missing assets into the listener's cache.
#[tokio::test]
async fn version_announce_syncs_the_bundle() {
    let hub = MemoryHub::new();
    let pioneer = spawn_node(&hub, "weft-pion0006", |c| c.mesh.pioneer = true).await;
    let peer = spawn_node(&hub, "weft-peer0006", |_| {}).await;
    connect(&pioneer, &peer).await;
    settle().await;

    pioneer
        .version()
        .seed_assets(
            "2.0.0",
            &[
                ("/index.html".to_string(), b"<html/>".to_vec(), None),
                ("/app.js".to_string(), b"boot()".to_vec(), None),
            ],
        )
        .await
        .unwrap();
    pioneer.version().announce().await.unwrap();
    settle().await;
    settle().await;

    let cached = peer.version().cached_asset("/app.js").await.unwrap().unwrap();
    assert_eq!(cached.data, b"boot()");
}
