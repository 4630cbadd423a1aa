use crate::*;

use std::time::Duration;

use weft_services::RecoveryError;

/// The full ceremony: scatter to three guardians, lose the node, come
/// back with a fresh peer id, and resurrect the identity from any two.
#[tokio::test]
async fn identity_survives_through_guardians() {
    let hub = MemoryHub::new();
    let owner = spawn_node(&hub, "weft-self0001", |_| {}).await;
    let g1 = spawn_node(&hub, "weft-grd10001", |_| {}).await;
    let g2 = spawn_node(&hub, "weft-grd20001", |_| {}).await;
    let g3 = spawn_node(&hub, "weft-grd30001", |_| {}).await;
    connect_all(&[&owner, &g1, &g2, &g3]).await;
    settle().await;

    let record = owner.identity_record();
    owner
        .recovery()
        .designate_guardians(
            &record,
            &[
                g1.local_id().to_string(),
                g2.local_id().to_string(),
                g3.local_id().to_string(),
            ],
        )
        .await
        .unwrap();
    settle().await;

    // The owner disappears; only two guardians are still around.
    owner.shutdown();
    hub.detach(owner.local_id());
    g3.shutdown();
    hub.detach(g3.local_id());

    let heir = spawn_node(&hub, "weft-heir0001", |_| {}).await;
    connect(&heir, &g1).await;
    connect(&heir, &g2).await;
    settle().await;

    let recovered = heir
        .recovery()
        .resurrect("weft-self0001", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(recovered, record);
}

/// One guardian alone cannot resurrect: a single share reveals nothing
/// and the ceremony times out below threshold.
#[tokio::test]
async fn single_guardian_cannot_resurrect() {
    let hub = MemoryHub::new();
    let owner = spawn_node(&hub, "weft-self0002", |_| {}).await;
    let g1 = spawn_node(&hub, "weft-grd10002", |_| {}).await;
    let g2 = spawn_node(&hub, "weft-grd20002", |_| {}).await;
    let g3 = spawn_node(&hub, "weft-grd30002", |_| {}).await;
    connect_all(&[&owner, &g1, &g2, &g3]).await;
    settle().await;

    let record = owner.identity_record();
    owner
        .recovery()
        .designate_guardians(
            &record,
            &[
                g1.local_id().to_string(),
                g2.local_id().to_string(),
                g3.local_id().to_string(),
            ],
        )
        .await
        .unwrap();
    settle().await;

    owner.shutdown();
    hub.detach(owner.local_id());
    for g in [&g2, &g3] {
        g.shutdown();
        hub.detach(g.local_id());
    }

    let heir = spawn_node(&hub, "weft-heir0002", |_| {}).await;
    connect(&heir, &g1).await;
    settle().await;

    let err = heir
        .recovery()
        .resurrect("weft-self0002", Duration::from_millis(400))
        .await
        .unwrap_err();
    assert!(matches!(err, RecoveryError::Timeout));
}

/// Guardianship takes exactly three guardians.
#[tokio::test]
async fn guardian_count_is_exactly_three() {
    let hub = MemoryHub::new();
    let owner = spawn_node(&hub, "weft-self0003", |_| {}).await;
    let record = owner.identity_record();

    let err = owner
        .recovery()
        .designate_guardians(&record, &["only-one".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RecoveryError::GuardianCount { got: 1 }));
}

/// A non-guardian bystander holds no shard and stays silent, so a
/// resurrection request does not leak anything through it.
#[tokio::test]
async fn bystanders_hold_nothing() {
    let hub = MemoryHub::new();
    let owner = spawn_node(&hub, "weft-self0004", |_| {}).await;
    let g1 = spawn_node(&hub, "weft-grd10004", |_| {}).await;
    let g2 = spawn_node(&hub, "weft-grd20004", |_| {}).await;
    let g3 = spawn_node(&hub, "weft-grd30004", |_| {}).await;
    let bystander = spawn_node(&hub, "weft-byst0004", |_| {}).await;
    connect_all(&[&owner, &g1, &g2, &g3, &bystander]).await;
    settle().await;

    owner
        .recovery()
        .designate_guardians(
            &owner.identity_record(),
            &[
                g1.local_id().to_string(),
                g2.local_id().to_string(),
                g3.local_id().to_string(),
            ],
        )
        .await
        .unwrap();
    settle().await;

    let vaulted = bystander
        .store()
        .keys_with_prefix("vault/")
        .await
        .unwrap();
    assert!(vaulted.is_empty());
}
