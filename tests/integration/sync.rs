use crate::*;

/// Counter increments converge across the mesh.
#[tokio::test]
async fn counter_converges_across_nodes() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-cnt00001", |_| {}).await;
    let b = spawn_node(&hub, "weft-cnt00002", |_| {}).await;
    let c = spawn_node(&hub, "weft-cnt00003", |_| {}).await;
    connect_all(&[&a, &b, &c]).await;
    settle().await;

    a.increment_counter().await.unwrap();
    settle().await;
    assert_eq!(b.counter_value(), 1);
    assert_eq!(c.counter_value(), 1);

    b.increment_counter().await.unwrap();
    settle().await;
    assert_eq!(a.counter_value(), 2);
    assert_eq!(c.counter_value(), 2);
}

/// Posts propagate to every listener's timeline.
#[tokio::test]
async fn posts_reach_every_timeline() {
    let hub = MemoryHub::new();
    let author = spawn_node(&hub, "weft-soc00001", |c| {
        c.identity.display_name = "Ada".into();
    })
    .await;
    let reader = spawn_node(&hub, "weft-soc00002", |_| {}).await;
    connect(&author, &reader).await;
    settle().await;

    author.social().publish("hello mesh").await.unwrap();
    settle().await;

    let timeline = reader.social().timeline().await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].content, "hello mesh");
    assert_eq!(timeline[0].author_name, "Ada");
    assert_eq!(timeline[0].author_id, "weft-soc00001");
}

/// Concurrent note edits resolve last-writer-wins on both replicas.
#[tokio::test]
async fn note_edits_resolve_last_writer_wins() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-note0001", |_| {}).await;
    let b = spawn_node(&hub, "weft-note0002", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    a.notes().save(Some("n1"), "list", "first").await.unwrap();
    settle().await;
    b.notes().save(Some("n1"), "list", "second").await.unwrap();
    settle().await;

    assert_eq!(a.notes().get("n1").await.unwrap().unwrap().content, "second");
    assert_eq!(b.notes().get("n1").await.unwrap().unwrap().content, "second");
}

/// Deletes propagate and stale saves cannot resurrect a deleted note.
#[tokio::test]
async fn note_deletion_propagates() {
    let hub = MemoryHub::new();
    let a = spawn_node(&hub, "weft-note0003", |_| {}).await;
    let b = spawn_node(&hub, "weft-note0004", |_| {}).await;
    connect(&a, &b).await;
    settle().await;

    a.notes().save(Some("n1"), "t", "body").await.unwrap();
    settle().await;
    assert!(b.notes().get("n1").await.unwrap().is_some());

    b.notes().delete("n1").await.unwrap();
    settle().await;
    assert!(a.notes().get("n1").await.unwrap().is_none());
    assert!(b.notes().get("n1").await.unwrap().is_none());
}
