//! Shared fixtures for the end-to-end scenarios: an in-process overlay mesh
//! wiring several engines together, a scriptable trust oracle, and a
//! settlement rail that fails on cue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use corridor_core::{
    Amount, Currency, FiatCurrency, NodeConfig, NodeId, Overlay, OverlayError, PaymentState,
    TrustOracle,
};
use corridor_engine::{MemoryStorage, PaymentEngine, PaymentStatus, Storage};
use corridor_routing::RouteEntry;
use corridor_settlement::{
    CostEstimate, SettlementAdapter, SettlementError, SettlementRegistry, SettlementRequest,
    SettlementResult, SettlementStatus,
};

/// Install a test subscriber once per process. `RUST_LOG` controls the
/// filter as usual.
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn node(id: &str) -> NodeId {
    NodeId::new(id).expect("valid node id")
}

pub fn usd(value: u128) -> Amount {
    Amount::new(value, Currency::Fiat(FiatCurrency::USD))
}

/// A route table entry as this node would hold it after learning the edge
/// `via -> dest`.
pub fn edge(dest: &str, via: &str, fee_rate: f64, trust: f64, hops: u32) -> RouteEntry {
    RouteEntry {
        destination: node(dest),
        next_hop: node(via),
        supported_currencies: vec![Currency::Fiat(FiatCurrency::USD)],
        liquidity: 10_000_000,
        fee_rate,
        latency_ms: 20,
        trust_score: trust,
        expires_at: Utc::now() + chrono::Duration::seconds(600),
        hop_count: hops,
    }
}

/// In-process overlay connecting every joined engine. Broadcasts fan out to
/// all peers except the sender; directed sends invoke the target engine's
/// frame handler and hand back its response.
#[derive(Default)]
pub struct Mesh {
    nodes: DashMap<NodeId, Arc<PaymentEngine>>,
}

impl Mesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn join(&self, engine: &Arc<PaymentEngine>) {
        self.nodes
            .insert(engine.node_id().clone(), Arc::clone(engine));
    }

    pub fn drop_node(&self, id: &NodeId) {
        self.nodes.remove(id);
    }

    pub fn port(self: &Arc<Self>, origin: &str) -> Arc<MeshPort> {
        Arc::new(MeshPort {
            origin: node(origin),
            mesh: Arc::clone(self),
        })
    }
}

/// One node's view of the [`Mesh`].
pub struct MeshPort {
    origin: NodeId,
    mesh: Arc<Mesh>,
}

#[async_trait]
impl Overlay for MeshPort {
    async fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), OverlayError> {
        let peers: Vec<Arc<PaymentEngine>> = self
            .mesh
            .nodes
            .iter()
            .filter(|entry| *entry.key() != self.origin)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for peer in peers {
            if let Err(err) = peer.handle_broadcast(topic, &payload).await {
                tracing::debug!(topic, %err, "peer rejected broadcast");
            }
        }
        Ok(())
    }

    async fn send(&self, peer: &NodeId, payload: Vec<u8>) -> Result<Vec<u8>, OverlayError> {
        let target = self
            .mesh
            .nodes
            .get(peer)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OverlayError::PeerUnreachable(peer.clone()))?;
        let response = target
            .handle_frame(&self.origin, &payload)
            .map_err(|err| OverlayError::Transport(err.to_string()))?;
        Ok(response.unwrap_or_default())
    }
}

/// Trust oracle with fixed per-peer scores and a log of every outcome the
/// engine reports back.
pub struct ScriptedTrust {
    default_score: f64,
    scores: Mutex<HashMap<NodeId, f64>>,
    outcomes: Mutex<Vec<(NodeId, bool)>>,
}

impl ScriptedTrust {
    pub fn new(default_score: f64) -> Arc<Self> {
        Arc::new(Self {
            default_score,
            scores: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_score(&self, peer: &str, score: f64) {
        self.scores
            .lock()
            .expect("scores lock")
            .insert(node(peer), score);
    }

    pub fn outcomes(&self) -> Vec<(NodeId, bool)> {
        self.outcomes.lock().expect("outcomes lock").clone()
    }
}

#[async_trait]
impl TrustOracle for ScriptedTrust {
    async fn trust_score(&self, peer: &NodeId) -> f64 {
        self.scores
            .lock()
            .expect("scores lock")
            .get(peer)
            .copied()
            .unwrap_or(self.default_score)
    }

    async fn report_outcome(&self, peer: &NodeId, success: bool) {
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .push((peer.clone(), success));
    }
}

/// Instant ledger rail whose nth initiation (1-based, counted across the
/// rail's lifetime) can be scripted to fail.
pub struct FlakyRail {
    calls: AtomicU64,
    fail_on: Mutex<Vec<u64>>,
    delay: Mutex<Duration>,
    txs: Mutex<HashMap<String, SettlementStatus>>,
}

impl FlakyRail {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail_on: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            txs: Mutex::new(HashMap::new()),
        })
    }

    pub fn fail_initiation(&self, nth: u64) {
        self.fail_on.lock().expect("fail list lock").push(nth);
    }

    /// Make every lock take this long, so a test can get a word in between
    /// hops.
    pub fn set_initiate_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub fn status_of(&self, transaction_id: &str) -> Option<SettlementStatus> {
        self.txs
            .lock()
            .expect("tx lock")
            .get(transaction_id)
            .copied()
    }
}

#[async_trait]
impl SettlementAdapter for FlakyRail {
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError> {
        request.validate()?;
        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.lock().expect("fail list lock").contains(&call) {
            return Err(SettlementError::Backend(format!(
                "injected failure on initiation {}",
                call
            )));
        }
        let transaction_id = format!("flaky-{}", Uuid::now_v7());
        self.txs
            .lock()
            .expect("tx lock")
            .insert(transaction_id.clone(), SettlementStatus::Pending);
        Ok(SettlementResult {
            transaction_id,
            status: SettlementStatus::Pending,
            timestamp: Utc::now(),
            fee: Amount::new(0, request.amount.currency.clone()),
            message: "locked".into(),
        })
    }

    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        self.transition(transaction_id, SettlementStatus::Confirmed)
    }

    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        self.transition(transaction_id, SettlementStatus::RolledBack)
    }

    async fn get_status(
        &self,
        transaction_id: &str,
    ) -> Result<SettlementStatus, SettlementError> {
        self.status_of(transaction_id)
            .ok_or_else(|| SettlementError::NotFound(transaction_id.into()))
    }

    async fn estimate_cost(&self, amount: &Amount) -> Result<CostEstimate, SettlementError> {
        let zero = Amount::new(0, amount.currency.clone());
        Ok(CostEstimate {
            base_fee: zero.clone(),
            network_fee: zero.clone(),
            total_fee: zero,
            estimated_time: Duration::ZERO,
        })
    }

    async fn estimate_latency(&self, _amount: &Amount) -> Result<Duration, SettlementError> {
        Ok(Duration::ZERO)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![Currency::Fiat(FiatCurrency::USD)]
    }

    fn layer_id(&self) -> &str {
        "flaky"
    }
}

impl FlakyRail {
    fn transition(
        &self,
        transaction_id: &str,
        to: SettlementStatus,
    ) -> Result<SettlementResult, SettlementError> {
        let mut txs = self.txs.lock().expect("tx lock");
        let status = txs
            .get_mut(transaction_id)
            .ok_or_else(|| SettlementError::NotFound(transaction_id.into()))?;
        if *status != SettlementStatus::Pending {
            return Err(SettlementError::InvalidTransition(format!(
                "{} is {}, not Pending",
                transaction_id, status
            )));
        }
        *status = to;
        Ok(SettlementResult {
            transaction_id: transaction_id.into(),
            status: to,
            timestamp: Utc::now(),
            fee: usd(0),
            message: String::new(),
        })
    }
}

pub fn config_for(id: &str) -> NodeConfig {
    NodeConfig {
        node_id: id.into(),
        discovery_window_ms: 25,
        ..NodeConfig::default()
    }
}

/// Build an engine on the mesh with in-memory storage and the default rails.
pub fn spawn_node(mesh: &Arc<Mesh>, id: &str, trust: &Arc<ScriptedTrust>) -> Arc<PaymentEngine> {
    spawn_node_with(mesh, id, trust, Arc::new(MemoryStorage::new()), None)
}

pub fn spawn_node_with(
    mesh: &Arc<Mesh>,
    id: &str,
    trust: &Arc<ScriptedTrust>,
    storage: Arc<MemoryStorage>,
    registry: Option<Arc<SettlementRegistry>>,
) -> Arc<PaymentEngine> {
    let engine = PaymentEngine::new(
        config_for(id),
        mesh.port(id),
        Arc::clone(trust) as Arc<dyn TrustOracle>,
        storage as Arc<dyn Storage>,
    )
    .expect("engine construction");
    let engine = match registry {
        Some(registry) => engine.with_registry(registry),
        None => engine,
    };
    let engine = Arc::new(engine);
    mesh.join(&engine);
    engine
}

/// Poll a payment until it reaches `wanted`. Panics early when it lands in
/// a different terminal state.
pub async fn wait_for_state(
    engine: &PaymentEngine,
    id: &Uuid,
    wanted: PaymentState,
) -> PaymentStatus {
    for _ in 0..400 {
        let status = engine.get_payment_status(id).expect("payment status");
        if status.state == wanted {
            return status;
        }
        if status.state.is_terminal() {
            panic!(
                "payment ended {:?} while waiting for {:?} ({:?})",
                status.state, wanted, status.failure
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {:?}", wanted);
}
