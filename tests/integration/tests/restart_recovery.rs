//! Integration: a node goes down mid-settlement and comes back. Recovery
//! reconciles against the rails instead of re-initiating, and the restored
//! route checkpoint carries new traffic.

use chrono::Utc;
use corridor_core::{PaymentMessage, PaymentState};
use corridor_engine::{MemoryStorage, PaymentRecord, Storage};
use corridor_integration_tests::{
    edge, init_tracing, node, spawn_node, spawn_node_with, usd, wait_for_state, Mesh,
    ScriptedTrust,
};
use corridor_settlement::{
    HtlcCascade, InternalLedgerAdapter, LockState, SettlementAdapter, SettlementRegistry,
    SettlementRequest, SettlementStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn internal_registry() -> Arc<SettlementRegistry> {
    let mut registry = SettlementRegistry::new();
    registry.register(Arc::new(InternalLedgerAdapter::new()));
    Arc::new(registry)
}

/// A payment frozen in `Settling` with one recorded hop lock, as a crash
/// would leave it. Returns the payment id and the rail transaction id.
async fn freeze_mid_settlement(
    storage: &Arc<MemoryStorage>,
    registry: &Arc<SettlementRegistry>,
    confirm: bool,
) -> (uuid::Uuid, String) {
    let payment = PaymentMessage::builder()
        .sender(node("alice"))
        .receiver(node("bob"))
        .amount(usd(10_000))
        .build()
        .unwrap();
    let id = payment.id;
    let mut record = PaymentRecord::new(payment);
    record.payment.state = PaymentState::Settling;

    let adapter = registry.adapter("internal").unwrap();
    let request = SettlementRequest {
        payment_id: id,
        amount: usd(10_000),
        from_address: "alice".into(),
        to_address: "bob".into(),
        lock_expiry: None,
    };
    let tx = adapter.initiate(request).await.unwrap().transaction_id;
    if confirm {
        adapter.confirm(&tx).await.unwrap();
    }

    let mut cascade = HtlcCascade::build(
        id,
        node("alice"),
        vec![(node("bob"), "internal".into(), usd(10_000))],
        Duration::from_secs(180),
        Duration::from_secs(60),
    )
    .unwrap();
    cascade.record_lock(0, tx.clone()).unwrap();

    storage.put_payment(&record).unwrap();
    storage.put_cascade(&cascade).unwrap();
    (id, tx)
}

// =========================================================================
// Confirmed lock: the payment had actually settled
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_confirmed_lock_recovers_to_settled_after_restart() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let storage = Arc::new(MemoryStorage::new());
    let registry = internal_registry();

    // The rail outlives the node; only the engine restarts.
    let _before = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), Some(Arc::clone(&registry)));
    let (id, _tx) = freeze_mid_settlement(&storage, &registry, true).await;

    let after = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), Some(Arc::clone(&registry)));
    let report = after.recover().await.unwrap();

    assert_eq!(report.payments_loaded, 1);
    assert_eq!(report.payments_resumed, 1);
    assert_eq!(
        after.get_payment_status(&id).unwrap().state,
        PaymentState::Settled
    );
    let cascade = storage.get_cascade(&id).unwrap().unwrap();
    assert_eq!(cascade.locks[0].state, LockState::Claimed);
    assert_eq!(trust.outcomes(), vec![(node("bob"), true)]);
}

// =========================================================================
// Unconfirmed lock: reverse it, never re-initiate
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pending_lock_is_rolled_back_after_restart() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let storage = Arc::new(MemoryStorage::new());
    let registry = internal_registry();

    let _before = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), Some(Arc::clone(&registry)));
    let (id, tx) = freeze_mid_settlement(&storage, &registry, false).await;

    let after = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), Some(Arc::clone(&registry)));
    after.recover().await.unwrap();

    let status = after.get_payment_status(&id).unwrap();
    assert_eq!(status.state, PaymentState::Failed);
    assert!(status.failure.unwrap().contains("interrupted"));

    // The money is back where it was.
    let adapter = registry.adapter("internal").unwrap();
    assert_eq!(
        adapter.get_status(&tx).await.unwrap(),
        SettlementStatus::RolledBack
    );
    assert_eq!(trust.outcomes(), vec![(node("bob"), false)]);
}

// =========================================================================
// Route checkpoint: restored, pruned, and immediately usable
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_restored_routes_carry_new_payments() {
    init_tracing();
    let mesh = Mesh::new();
    let trust = ScriptedTrust::new(0.9);
    let storage = Arc::new(MemoryStorage::new());

    let before = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), None);
    before
        .register_channel(
            node("bob"),
            vec![corridor_core::Currency::Fiat(corridor_core::FiatCurrency::USD)],
            1_000_000,
            0.0,
            10,
            600,
        )
        .await
        .unwrap();

    // A route that expired while the node was down sits in the checkpoint
    // next to the live one.
    let mut checkpoint = storage.routes().unwrap();
    let mut stale = edge("carol", "alice", 0.001, 0.9, 0);
    stale.expires_at = Utc::now() - chrono::Duration::seconds(30);
    checkpoint.push(stale);
    storage.put_routes(&checkpoint).unwrap();

    spawn_node(&mesh, "bob", &trust);
    let after = spawn_node_with(&mesh, "alice", &trust, Arc::clone(&storage), None);
    assert!(after.table().is_empty());

    let report = after.recover().await.unwrap();
    assert_eq!(report.routes_restored, 1);
    assert_eq!(report.routes_dropped, 1);
    assert_eq!(after.table().len(), 1);

    let id = after
        .submit_payment(node("alice"), node("bob"), usd(2_500), Vec::new())
        .await
        .unwrap();
    wait_for_state(&after, &id, PaymentState::Settled).await;
}
