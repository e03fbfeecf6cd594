//! Integration: payments driven end to end over a mesh of engines, from
//! route selection through the HTLC cascade to terminal state.

use corridor_core::PaymentState;
use corridor_integration_tests::{
    edge, init_tracing, node, spawn_node, spawn_node_with, usd, wait_for_state, Mesh,
    ScriptedTrust,
};
use corridor_engine::{MemoryStorage, Storage};
use corridor_routing::PathSearch;
use corridor_settlement::LockState;
use std::sync::Arc;

// =========================================================================
// Happy path: three hops, seeded topology
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_three_hop_payment_settles_end_to_end() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);

    let storage_a = Arc::new(MemoryStorage::new());
    let alice = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage_a), None);
    spawn_node(&mesh, "bob", &trust);
    spawn_node(&mesh, "carol", &trust);
    spawn_node(&mesh, "dave", &trust);

    // alice -> bob -> carol -> dave, as alice's table sees it.
    alice.table().upsert(edge("bob", "alice", 0.001, 0.9, 0)).unwrap();
    alice.table().upsert(edge("carol", "bob", 0.002, 0.9, 1)).unwrap();
    alice.table().upsert(edge("dave", "carol", 0.001, 0.9, 2)).unwrap();

    let memo = serde_json::to_vec(&serde_json::json!({ "invoice": "INV-2026-07" })).unwrap();
    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(10_000), memo)
        .await
        .unwrap();

    let status = wait_for_state(&alice, &id, PaymentState::Settled).await;
    assert_eq!(status.attempt, 0);
    assert!(status.failure.is_none());

    // Every hop lock claimed, amounts layered so each forwarder keeps its
    // fee: 0.2% of 10_000 then 0.1% of 10_000 on top of the delivered sum.
    let cascade = storage_a.get_cascade(&id).unwrap().unwrap();
    assert_eq!(cascade.hop_count(), 3);
    let peers: Vec<_> = cascade.locks.iter().map(|l| l.peer.clone()).collect();
    assert_eq!(peers, vec![node("bob"), node("carol"), node("dave")]);
    assert!(cascade.locks.iter().all(|l| l.state == LockState::Claimed));
    assert_eq!(cascade.locks[0].amount.value, 10_030);
    assert_eq!(cascade.locks[1].amount.value, 10_010);
    assert_eq!(cascade.locks[2].amount.value, 10_000);

    // Each hop peer got a success report.
    let outcomes = trust.outcomes();
    assert_eq!(
        outcomes,
        vec![
            (node("bob"), true),
            (node("carol"), true),
            (node("dave"), true),
        ]
    );
}

// =========================================================================
// Discovery: routes learned live over the mesh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_discovery_over_the_mesh_reaches_a_distant_node() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.8);

    let alice = spawn_node(&mesh, "alice", &trust);
    let bob = spawn_node(&mesh, "bob", &trust);
    let carol = spawn_node(&mesh, "carol", &trust);
    spawn_node(&mesh, "dave", &trust);

    let currencies = || vec![corridor_core::Currency::Fiat(corridor_core::FiatCurrency::USD)];
    alice
        .register_channel(node("bob"), currencies(), 5_000_000, 0.001, 10, 600)
        .await
        .unwrap();
    bob.register_channel(node("carol"), currencies(), 5_000_000, 0.002, 10, 600)
        .await
        .unwrap();
    carol
        .register_channel(node("dave"), currencies(), 5_000_000, 0.001, 10, 600)
        .await
        .unwrap();

    // Each forwarder announces its channels to the mesh.
    bob.advertise(600).await.unwrap();
    carol.advertise(600).await.unwrap();

    // alice now knows more than her own channel.
    assert!(alice.table().len() > 1);

    match alice.find_routes(&node("dave"), &usd(1_000)).await.unwrap() {
        PathSearch::Found(paths) => {
            assert_eq!(paths[0].receiver(), Some(&node("dave")));
        }
        other => panic!("expected routes to dave, got {:?}", other),
    }

    let id = alice
        .submit_payment(node("alice"), node("dave"), usd(1_000), Vec::new())
        .await
        .unwrap();
    wait_for_state(&alice, &id, PaymentState::Settled).await;
}

// =========================================================================
// Ranking: repeated searches agree
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_route_ranking_is_stable_and_prefers_cheap_trusted_paths() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let alice = spawn_node(&mesh, "alice", &trust);

    // Two disjoint two-hop routes to dave: via bob (cheap, trusted) and
    // via carol (pricier, shakier).
    alice.table().upsert(edge("bob", "alice", 0.001, 0.9, 0)).unwrap();
    alice.table().upsert(edge("dave", "bob", 0.001, 0.9, 1)).unwrap();
    alice.table().upsert(edge("carol", "alice", 0.005, 0.5, 0)).unwrap();
    alice.table().upsert(edge("dave", "carol", 0.005, 0.5, 1)).unwrap();

    let sequences = |search: PathSearch| -> Vec<Vec<corridor_core::NodeId>> {
        match search {
            PathSearch::Found(paths) => paths.iter().map(|p| p.node_sequence()).collect(),
            other => panic!("expected paths, got {:?}", other),
        }
    };

    let first = sequences(alice.find_routes(&node("dave"), &usd(2_000)).await.unwrap());
    let second = sequences(alice.find_routes(&node("dave"), &usd(2_000)).await.unwrap());

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(
        first[0],
        vec![node("alice"), node("bob"), node("dave")],
        "the cheap, trusted route ranks first"
    );
}
