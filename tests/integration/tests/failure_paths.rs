//! Integration: what a payment does when a hop fails, the receiver is
//! gone, or the sender changes their mind mid-cascade.

use corridor_core::PaymentState;
use corridor_engine::{MemoryStorage, Storage};
use corridor_integration_tests::{
    edge, init_tracing, node, spawn_node, spawn_node_with, usd, wait_for_state, FlakyRail, Mesh,
    ScriptedTrust,
};
use corridor_settlement::{LockState, SettlementRegistry, SettlementStatus};
use std::sync::Arc;
use std::time::Duration;

fn flaky_registry(rail: &Arc<FlakyRail>) -> Arc<SettlementRegistry> {
    let mut registry = SettlementRegistry::new();
    registry.register(Arc::clone(rail));
    Arc::new(registry)
}

fn seed_chain(alice: &corridor_engine::PaymentEngine) {
    alice.table().upsert(edge("bob", "alice", 0.001, 0.9, 0)).unwrap();
    alice.table().upsert(edge("carol", "bob", 0.002, 0.9, 1)).unwrap();
    alice.table().upsert(edge("dave", "carol", 0.001, 0.9, 2)).unwrap();
}

// =========================================================================
// Mid-path rail failure, no alternate route
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_hop_failure_rolls_back_upstream_and_names_the_hop() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let rail = FlakyRail::new();

    let storage_a = Arc::new(MemoryStorage::new());
    let alice = spawn_node_with(
        &mesh,
        "alice",
        &trust,
        Arc::clone(&storage_a),
        Some(flaky_registry(&rail)),
    );
    spawn_node(&mesh, "dave", &trust);
    seed_chain(&alice);

    // First lock succeeds, the second (carol's hop) blows up.
    rail.fail_initiation(2);

    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(10_000), Vec::new())
        .await
        .unwrap();

    let status = wait_for_state(&alice, &id, PaymentState::Failed).await;
    let failure = status.failure.unwrap();
    assert!(failure.contains("hop 2"), "failure was: {}", failure);
    assert!(failure.contains("alternates exhausted"), "failure was: {}", failure);

    // bob's lock was reversed on the rail, carol's never existed, dave was
    // never touched.
    let cascade = storage_a.get_cascade(&id).unwrap().unwrap();
    assert_eq!(cascade.locks[0].state, LockState::RolledBack);
    assert_eq!(cascade.locks[1].state, LockState::Failed);
    assert_eq!(cascade.locks[2].state, LockState::Pending);
    let tx = cascade.locks[0].transaction_id.as_deref().unwrap();
    assert_eq!(rail.status_of(tx), Some(SettlementStatus::RolledBack));
    assert!(cascade.locks[2].transaction_id.is_none());

    assert_eq!(
        trust.outcomes(),
        vec![(node("bob"), false), (node("carol"), false)]
    );
}

// =========================================================================
// Retry: the alternate route carries the payment
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_retries_on_the_alternate_route() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let rail = FlakyRail::new();

    let storage_a = Arc::new(MemoryStorage::new());
    let alice = spawn_node_with(
        &mesh,
        "alice",
        &trust,
        Arc::clone(&storage_a),
        Some(flaky_registry(&rail)),
    );
    spawn_node(&mesh, "dave", &trust);

    // Disjoint two-hop routes: via bob (preferred) and via carol.
    alice.table().upsert(edge("bob", "alice", 0.001, 0.9, 0)).unwrap();
    alice.table().upsert(edge("dave", "bob", 0.001, 0.9, 1)).unwrap();
    alice.table().upsert(edge("carol", "alice", 0.005, 0.8, 0)).unwrap();
    alice.table().upsert(edge("dave", "carol", 0.005, 0.8, 1)).unwrap();

    // The very first lock of the first attempt fails.
    rail.fail_initiation(1);

    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(10_000), Vec::new())
        .await
        .unwrap();

    let status = wait_for_state(&alice, &id, PaymentState::Settled).await;
    assert_eq!(status.attempt, 1);
    assert!(status.failure.is_none());

    // The stored cascade is the winning attempt's, running via carol.
    let cascade = storage_a.get_cascade(&id).unwrap().unwrap();
    let peers: Vec<_> = cascade.locks.iter().map(|l| l.peer.clone()).collect();
    assert_eq!(peers, vec![node("carol"), node("dave")]);
    assert!(cascade.locks.iter().all(|l| l.state == LockState::Claimed));

    assert_eq!(
        trust.outcomes(),
        vec![
            (node("bob"), false),
            (node("carol"), true),
            (node("dave"), true),
        ]
    );
}

// =========================================================================
// Receiver unreachable
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unreachable_receiver_withdraws_the_payment() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let alice = spawn_node(&mesh, "alice", &trust);
    // dave never joins the mesh.
    seed_chain(&alice);

    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(3_000), Vec::new())
        .await
        .unwrap();

    let status = wait_for_state(&alice, &id, PaymentState::Cancelled).await;
    assert!(status.failure.unwrap().contains("unreachable"));
}

// =========================================================================
// Cancellation while locks are going down
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_during_settlement_rolls_back_and_does_not_retry() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let rail = FlakyRail::new();

    let storage_a = Arc::new(MemoryStorage::new());
    let alice = spawn_node_with(
        &mesh,
        "alice",
        &trust,
        Arc::clone(&storage_a),
        Some(flaky_registry(&rail)),
    );
    spawn_node(&mesh, "dave", &trust);
    seed_chain(&alice);

    // Each lock takes 50ms, leaving room to cancel between hops.
    rail.set_initiate_delay(Duration::from_millis(50));

    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(10_000), Vec::new())
        .await
        .unwrap();

    let canceller = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            alice.cancel_payment(&id).unwrap();
        })
    };

    let status = wait_for_state(&alice, &id, PaymentState::Failed).await;
    canceller.await.unwrap();
    assert_eq!(status.failure.as_deref(), Some("cancelled during settlement"));

    // The first lock went down before the flag was seen and came back up;
    // nothing further was attempted, on this route or any other.
    let cascade = storage_a.get_cascade(&id).unwrap().unwrap();
    assert_eq!(cascade.locks[0].state, LockState::RolledBack);
    assert_eq!(cascade.locks[1].state, LockState::Pending);
    assert_eq!(cascade.locks[2].state, LockState::Pending);
    assert_eq!(status.attempt, 0);
}
