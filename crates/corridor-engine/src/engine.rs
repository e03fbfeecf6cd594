use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use corridor_core::state::advance;
use corridor_core::{
    Amount, Currency, NodeConfig, NodeId, Overlay, PaymentEvent, PaymentMessage, PaymentState,
    TrustOracle,
};
use corridor_routing::{
    Discovery, PathFinder, PathFinderConfig, PathSearch, RouteAdvertisement, RouteEntry,
    RouteTable, ADVERT_TOPIC,
};
use corridor_settlement::{
    BitcoinAdapter, CascadeOutcome, EthereumAdapter, FailureReason, HtlcCascade, HtlcConfig,
    HtlcEngine, InternalLedgerAdapter, LockState, SettlementRegistry, StablecoinAdapter,
};

use crate::error::EngineError;
use crate::storage::{PaymentRecord, Storage};
use crate::wire::{PaymentForward, PeerFrame};

/// Caller-facing view of one payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub id: Uuid,
    pub state: PaymentState,
    /// Index of the candidate path the latest attempt ran on.
    pub attempt: usize,
    pub failure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentRecord> for PaymentStatus {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            id: record.payment.id,
            state: record.payment.state,
            attempt: record.attempt,
            failure: record.failure.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// The embeddable payment engine.
///
/// Owns the route table, path finder, discovery, settlement registry and
/// HTLC engine; talks to the world through the injected overlay, trust
/// oracle and storage ports. Every submitted payment is driven by its own
/// task; the shared pieces are all concurrent-safe.
pub struct PaymentEngine {
    pub(crate) node_id: NodeId,
    pub(crate) config: NodeConfig,
    pub(crate) table: Arc<RouteTable>,
    pub(crate) finder: PathFinder,
    pub(crate) discovery: Discovery,
    pub(crate) registry: Arc<SettlementRegistry>,
    pub(crate) htlc_config: HtlcConfig,
    pub(crate) overlay: Arc<dyn Overlay>,
    pub(crate) oracle: Arc<dyn TrustOracle>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) in_flight: DashMap<Uuid, watch::Sender<bool>>,
}

impl PaymentEngine {
    /// Build an engine around the injected ports. The four built-in rails
    /// are registered; swap them with [`Self::with_registry`].
    pub fn new(
        config: NodeConfig,
        overlay: Arc<dyn Overlay>,
        oracle: Arc<dyn TrustOracle>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, EngineError> {
        let node_id = NodeId::new(config.node_id.clone())?;
        let finder = PathFinder::new(PathFinderConfig {
            max_hops: config.max_hops,
            ..PathFinderConfig::default()
        });
        let discovery = Discovery::new(
            node_id.clone(),
            Arc::clone(&overlay),
            Duration::from_millis(config.discovery_window_ms),
        );
        tracing::info!(node_id = %node_id, "payment engine created");

        Ok(Self {
            node_id,
            config,
            table: Arc::new(RouteTable::new()),
            finder,
            discovery,
            registry: Arc::new(Self::default_registry()),
            htlc_config: HtlcConfig::default(),
            overlay,
            oracle,
            storage,
            in_flight: DashMap::new(),
        })
    }

    fn default_registry() -> SettlementRegistry {
        let mut registry = SettlementRegistry::new();
        registry.register(Arc::new(InternalLedgerAdapter::new()));
        registry.register(Arc::new(BitcoinAdapter::new()));
        registry.register(Arc::new(EthereumAdapter::new()));
        registry.register(Arc::new(StablecoinAdapter::new()));
        registry
    }

    pub fn with_registry(mut self, registry: Arc<SettlementRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_path_config(mut self, config: PathFinderConfig) -> Self {
        self.finder = PathFinder::new(config);
        self
    }

    pub fn with_htlc_config(mut self, config: HtlcConfig) -> Self {
        self.htlc_config = config;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn registry(&self) -> &Arc<SettlementRegistry> {
        &self.registry
    }

    pub(crate) fn htlc(&self) -> HtlcEngine {
        HtlcEngine::new(Arc::clone(&self.registry), self.htlc_config.clone())
    }

    /// Validate, persist, route and launch a payment. Returns its id once a
    /// path is selected and the settlement driver is running.
    pub async fn submit_payment(
        self: &Arc<Self>,
        sender: NodeId,
        receiver: NodeId,
        amount: Amount,
        memo: Vec<u8>,
    ) -> Result<Uuid, EngineError> {
        if sender != self.node_id {
            return Err(EngineError::Validation(format!(
                "payments originate from this node ({}), not {}",
                self.node_id, sender
            )));
        }
        // A currency nobody settles fails before any state exists.
        self.registry.adapter_for_currency(&amount.currency)?;

        let payment = PaymentMessage::builder()
            .sender(sender)
            .receiver(receiver.clone())
            .amount(amount.clone())
            .metadata(memo)
            .ttl_secs(self.config.default_ttl_secs)
            .build()?;
        let id = payment.id;

        let mut record = PaymentRecord::new(payment);
        self.persist(&mut record)?;
        tracing::info!(payment_id = %id, receiver = %receiver, "payment submitted");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.in_flight.insert(id, cancel_tx);

        let value = record.payment.amount.value;
        let currency = record.payment.amount.currency.clone();
        let found = {
            let mut cancel = cancel_rx.clone();
            tokio::select! {
                found = self.finder.find_with_discovery(
                    &self.discovery,
                    self.oracle.as_ref(),
                    &self.table,
                    &self.node_id,
                    &receiver,
                    value,
                    &currency,
                ) => Some(found),
                _ = cancel.changed() => None,
            }
        };
        let search = match found {
            Some(Ok(search)) => search,
            Some(Err(err)) => {
                self.in_flight.remove(&id);
                return Err(err.into());
            }
            None => {
                record.payment.state =
                    advance(record.payment.state, PaymentEvent::CancelRequested)?;
                self.persist(&mut record)?;
                self.in_flight.remove(&id);
                tracing::info!(payment_id = %id, "payment cancelled before routing");
                return Ok(id);
            }
        };

        let paths = match search {
            PathSearch::Found(paths) => paths,
            PathSearch::NoRoute(reason) => {
                record.failure = Some(format!("no route: {}", reason));
                self.persist(&mut record)?;
                self.in_flight.remove(&id);
                return Err(EngineError::NoRoute {
                    destination: receiver,
                    reason,
                });
            }
        };

        record.candidates = paths;
        record.payment.state = advance(record.payment.state, PaymentEvent::RouteChosen)?;
        self.persist(&mut record)?;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drive(id, cancel_rx).await;
        });
        Ok(id)
    }

    pub fn get_payment_status(&self, id: &Uuid) -> Result<PaymentStatus, EngineError> {
        let record = self
            .storage
            .get_payment(id)?
            .ok_or(EngineError::PaymentNotFound(*id))?;
        Ok(PaymentStatus::from(&record))
    }

    /// Request cancellation. With a driver running this only raises the
    /// flag; the driver applies it at the next phase boundary, degrading to
    /// rollback once locks exist. Without one the transition applies here.
    pub fn cancel_payment(&self, id: &Uuid) -> Result<(), EngineError> {
        if let Some(handle) = self.in_flight.get(id) {
            let _ = handle.send(true);
            tracing::info!(payment_id = %id, "cancellation requested");
            return Ok(());
        }

        let mut record = self
            .storage
            .get_payment(id)?
            .ok_or(EngineError::PaymentNotFound(*id))?;
        match record.payment.state {
            PaymentState::Cancelled => Ok(()),
            state if state.is_terminal() => Err(EngineError::Validation(format!(
                "payment already {}",
                state
            ))),
            PaymentState::Settling => Err(EngineError::Validation(
                "payment is settling without a driver; recover first".into(),
            )),
            PaymentState::Failed => Err(EngineError::Validation(
                "payment already failed".into(),
            )),
            _ => {
                record.payment.state =
                    advance(record.payment.state, PaymentEvent::CancelRequested)?;
                self.persist(&mut record)?;
                tracing::info!(payment_id = %id, "payment cancelled");
                Ok(())
            }
        }
    }

    /// Discovery plus local selection, without submitting anything.
    pub async fn find_routes(
        &self,
        destination: &NodeId,
        amount: &Amount,
    ) -> Result<PathSearch, EngineError> {
        Ok(self
            .finder
            .find_with_discovery(
                &self.discovery,
                self.oracle.as_ref(),
                &self.table,
                &self.node_id,
                destination,
                amount.value,
                &amount.currency,
            )
            .await?)
    }

    /// Record a direct channel from this node to `peer`. Trust comes from
    /// the oracle, as it does for learned routes.
    pub async fn register_channel(
        &self,
        peer: NodeId,
        currencies: Vec<Currency>,
        liquidity: u128,
        fee_rate: f64,
        latency_ms: u64,
        ttl_secs: u32,
    ) -> Result<(), EngineError> {
        let trust = self.oracle.trust_score(&peer).await;
        let entry = RouteEntry {
            destination: peer.clone(),
            next_hop: self.node_id.clone(),
            supported_currencies: currencies,
            liquidity,
            fee_rate,
            latency_ms,
            trust_score: trust,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs as i64),
            hop_count: 0,
        };
        self.table.upsert(entry)?;
        self.checkpoint_routes()?;
        tracing::info!(peer = %peer, "channel registered");
        Ok(())
    }

    /// Broadcast this node's direct channels.
    pub async fn advertise(&self, ttl_secs: u32) -> Result<(), EngineError> {
        let advert = RouteAdvertisement::own(&self.node_id, &self.table, ttl_secs);
        self.broadcast_advert(advert).await
    }

    /// Broadcast the best learned route per destination, hop counts bumped.
    pub async fn readvertise(&self, ttl_secs: u32) -> Result<(), EngineError> {
        let advert = RouteAdvertisement::readvertise(
            &self.node_id,
            &self.table,
            ttl_secs,
            self.config.max_hops,
        );
        self.broadcast_advert(advert).await
    }

    async fn broadcast_advert(&self, advert: RouteAdvertisement) -> Result<(), EngineError> {
        if advert.announcements.is_empty() {
            return Ok(());
        }
        advert.validate()?;
        let payload = serde_json::to_vec(&advert)?;
        self.overlay.broadcast(ADVERT_TOPIC, payload).await?;
        tracing::debug!(count = advert.announcements.len(), "advertisement broadcast");
        Ok(())
    }

    /// Write the current route table to storage, replacing the previous
    /// checkpoint. Returns how many entries went out.
    pub fn checkpoint_routes(&self) -> Result<usize, EngineError> {
        let snapshot = self.table.snapshot();
        self.storage.put_routes(&snapshot)?;
        Ok(snapshot.len())
    }

    // Settlement driver. One task per payment; absorbs every per-attempt
    // failure into the record and only bubbles invariant breaches.
    async fn drive(&self, id: Uuid, cancel: watch::Receiver<bool>) {
        if let Err(err) = self.drive_inner(id, &cancel).await {
            tracing::error!(payment_id = %id, %err, "payment driver stopped");
            if let Ok(Some(mut record)) = self.storage.get_payment(&id) {
                record.failure = Some(err.to_string());
                if self.persist(&mut record).is_err() {
                    tracing::error!(payment_id = %id, "failure note could not be persisted");
                }
            }
        }
        self.in_flight.remove(&id);
    }

    async fn drive_inner(
        &self,
        id: Uuid,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let mut record = self
            .storage
            .get_payment(&id)?
            .ok_or(EngineError::PaymentNotFound(id))?;

        loop {
            // Phase boundary: Routed.
            if self.expire_if_due(&mut record)? {
                return Ok(());
            }
            if *cancel.borrow() {
                return self.cancel_now(&mut record);
            }

            let Some(path) = record.current_path().cloned() else {
                record.failure = Some("no candidate path for this attempt".into());
                self.persist(&mut record)?;
                return Ok(());
            };

            match self.request_acceptance(&record.payment).await {
                Ok(()) => {
                    record.payment.state =
                        advance(record.payment.state, PaymentEvent::ReceiverAccepted)?;
                    self.persist(&mut record)?;
                }
                Err(reason) => {
                    // The receiver will not take this payment on any path;
                    // the engine withdraws it.
                    tracing::warn!(payment_id = %id, %reason, "payment not accepted");
                    record.payment.state =
                        advance(record.payment.state, PaymentEvent::CancelRequested)?;
                    record.failure = Some(reason);
                    self.persist(&mut record)?;
                    return Ok(());
                }
            }

            // Phase boundary: Accepted.
            if self.expire_if_due(&mut record)? {
                return Ok(());
            }
            if *cancel.borrow() {
                return self.cancel_now(&mut record);
            }

            record.payment.state =
                advance(record.payment.state, PaymentEvent::SettlementStarted)?;
            self.persist(&mut record)?;

            let layer = self
                .registry
                .adapter_for_currency(&record.payment.amount.currency)?
                .layer_id()
                .to_string();
            let mut cascade = self.build_cascade(&record, &path, &layer)?;
            self.storage.put_cascade(&cascade)?;

            let outcome = self.htlc().settle(&mut cascade, cancel).await;
            self.storage.put_cascade(&cascade)?;

            match outcome {
                Err(err) => {
                    record.payment.state =
                        advance(record.payment.state, PaymentEvent::SettlementFailed)?;
                    record.failure = Some(err.to_string());
                    self.persist(&mut record)?;
                    self.report_outcomes(&cascade).await;
                    return Err(err.into());
                }
                Ok(CascadeOutcome::Settled) => {
                    record.payment.state =
                        advance(record.payment.state, PaymentEvent::SettlementSucceeded)?;
                    record.failure = None;
                    self.persist(&mut record)?;
                    self.report_outcomes(&cascade).await;
                    tracing::info!(payment_id = %id, attempt = record.attempt, "payment settled");
                    return Ok(());
                }
                Ok(CascadeOutcome::Failed { hop, reason }) => {
                    record.payment.state =
                        advance(record.payment.state, PaymentEvent::SettlementFailed)?;
                    self.report_outcomes(&cascade).await;

                    if matches!(reason, FailureReason::Cancelled) {
                        record.failure = Some("cancelled during settlement".into());
                        self.persist(&mut record)?;
                        return Ok(());
                    }
                    if record.has_alternate() && !record.payment.is_expired() {
                        record.failure = Some(format!("hop {}: {}", hop, reason));
                        record.attempt += 1;
                        record.payment.state =
                            advance(record.payment.state, PaymentEvent::RetryRoute)?;
                        self.persist(&mut record)?;
                        tracing::info!(
                            payment_id = %id,
                            attempt = record.attempt,
                            "retrying on alternate path"
                        );
                        continue;
                    }
                    record.failure =
                        Some(format!("hop {}: {} (alternates exhausted)", hop, reason));
                    self.persist(&mut record)?;
                    tracing::warn!(payment_id = %id, "payment failed permanently");
                    return Ok(());
                }
            }
        }
    }

    /// Forward the payment to its receiver and wait for the acceptance ack.
    /// `Err` carries the refusal reason.
    async fn request_acceptance(&self, payment: &PaymentMessage) -> Result<(), String> {
        let frame = PeerFrame::PaymentForward(PaymentForward {
            payment: payment.clone(),
        });
        let payload = frame
            .encode()
            .map_err(|e| format!("encode forward: {}", e))?;
        let response = self
            .overlay
            .send(&payment.receiver, payload)
            .await
            .map_err(|e| format!("receiver unreachable: {}", e))?;

        match PeerFrame::decode(&response) {
            Ok(PeerFrame::PaymentAck(ack)) if ack.payment_id == payment.id => {
                if ack.accepted {
                    Ok(())
                } else {
                    Err(format!(
                        "receiver refused: {}",
                        ack.reason.unwrap_or_else(|| "unspecified".into())
                    ))
                }
            }
            Ok(_) => Err("receiver answered with an unexpected frame".into()),
            Err(e) => Err(format!("undecodable acceptance response: {}", e)),
        }
    }

    /// Per-hop lock amounts: the delivered amount plus every downstream fee,
    /// so each forwarding node keeps its fee when claims propagate back.
    pub(crate) fn build_cascade(
        &self,
        record: &PaymentRecord,
        path: &corridor_routing::CandidatePath,
        layer: &str,
    ) -> Result<HtlcCascade, EngineError> {
        let amount = &record.payment.amount;
        let hops = path.hops();
        let mut specs = Vec::with_capacity(hops.len());
        for (k, hop) in hops.iter().enumerate() {
            let downstream_fees: u128 = hops[k + 1..]
                .iter()
                .map(|h| h.fee_for(amount.value))
                .sum();
            let value = amount.value.checked_add(downstream_fees).ok_or_else(|| {
                EngineError::Validation("amount plus forwarding fees overflows".into())
            })?;
            specs.push((
                hop.destination.clone(),
                layer.to_string(),
                Amount::new(value, amount.currency.clone()),
            ));
        }
        Ok(self
            .htlc()
            .cascade_for(record.payment.id, record.payment.sender.clone(), specs)?)
    }

    /// Tell the oracle how every touched hop peer behaved. Untouched hops
    /// are not reported.
    pub(crate) async fn report_outcomes(&self, cascade: &HtlcCascade) {
        for lock in &cascade.locks {
            let success = match lock.state {
                LockState::Claimed => true,
                LockState::RolledBack | LockState::Failed => false,
                LockState::Pending | LockState::Locked => continue,
            };
            self.oracle.report_outcome(&lock.peer, success).await;
        }
    }

    pub(crate) fn expire_if_due(&self, record: &mut PaymentRecord) -> Result<bool, EngineError> {
        if !record.payment.is_expired() {
            return Ok(false);
        }
        record.payment.state = advance(record.payment.state, PaymentEvent::TtlExpired)?;
        record.failure = Some("ttl elapsed before settlement".into());
        self.persist(record)?;
        tracing::info!(payment_id = %record.payment.id, "payment expired");
        Ok(true)
    }

    fn cancel_now(&self, record: &mut PaymentRecord) -> Result<(), EngineError> {
        record.payment.state = advance(record.payment.state, PaymentEvent::CancelRequested)?;
        self.persist(record)?;
        tracing::info!(payment_id = %record.payment.id, "payment cancelled");
        Ok(())
    }

    pub(crate) fn persist(&self, record: &mut PaymentRecord) -> Result<(), EngineError> {
        record.updated_at = Utc::now();
        self.storage.put_payment(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::wire::PaymentAck;
    use async_trait::async_trait;
    use corridor_core::{FiatCurrency, OverlayError};

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn usd(value: u128) -> Amount {
        Amount::new(value, Currency::Fiat(FiatCurrency::USD))
    }

    /// Overlay whose `send` plays the destination node: every forwarded
    /// payment is accepted.
    struct AcceptingOverlay;

    #[async_trait]
    impl Overlay for AcceptingOverlay {
        async fn broadcast(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), OverlayError> {
            Ok(())
        }
        async fn send(&self, peer: &NodeId, payload: Vec<u8>) -> Result<Vec<u8>, OverlayError> {
            match PeerFrame::decode(&payload) {
                Ok(PeerFrame::PaymentForward(fwd)) => {
                    PeerFrame::PaymentAck(PaymentAck::accept(fwd.payment.id))
                        .encode()
                        .map_err(|e| OverlayError::Transport(e.to_string()))
                }
                _ => Err(OverlayError::PeerUnreachable(peer.clone())),
            }
        }
    }

    /// Overlay that refuses every forwarded payment.
    struct RefusingOverlay;

    #[async_trait]
    impl Overlay for RefusingOverlay {
        async fn broadcast(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), OverlayError> {
            Ok(())
        }
        async fn send(&self, _peer: &NodeId, payload: Vec<u8>) -> Result<Vec<u8>, OverlayError> {
            match PeerFrame::decode(&payload) {
                Ok(PeerFrame::PaymentForward(fwd)) => {
                    PeerFrame::PaymentAck(PaymentAck::refuse(fwd.payment.id, "receiver busy"))
                        .encode()
                        .map_err(|e| OverlayError::Transport(e.to_string()))
                }
                _ => Err(OverlayError::Transport("unexpected frame".into())),
            }
        }
    }

    struct FixedTrust(f64);

    #[async_trait]
    impl TrustOracle for FixedTrust {
        async fn trust_score(&self, _peer: &NodeId) -> f64 {
            self.0
        }
        async fn report_outcome(&self, _peer: &NodeId, _success: bool) {}
    }

    fn engine_with(overlay: Arc<dyn Overlay>) -> (Arc<PaymentEngine>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let config = NodeConfig {
            node_id: "alice".into(),
            discovery_window_ms: 10,
            ..NodeConfig::default()
        };
        let engine = PaymentEngine::new(
            config,
            overlay,
            Arc::new(FixedTrust(0.9)),
            Arc::clone(&storage) as Arc<dyn Storage>,
        )
        .unwrap();
        (Arc::new(engine), storage)
    }

    async fn wait_for_state(
        engine: &PaymentEngine,
        id: &Uuid,
        wanted: PaymentState,
    ) -> PaymentStatus {
        for _ in 0..200 {
            let status = engine.get_payment_status(id).unwrap();
            if status.state == wanted {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "payment never reached {:?}, last state {:?}",
            wanted,
            engine.get_payment_status(id).unwrap()
        );
    }

    #[tokio::test]
    async fn test_submit_without_routes_is_a_no_route_error() {
        let (engine, storage) = engine_with(Arc::new(AcceptingOverlay));

        let err = engine
            .submit_payment(node("alice"), node("bob"), usd(1_000), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRoute { .. }));

        // The payment record survives with the reason on it.
        let records = storage.payments().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payment.state, PaymentState::Created);
        assert!(records[0].failure.as_deref().unwrap().contains("no route"));
    }

    #[tokio::test]
    async fn test_submit_rejects_foreign_sender() {
        let (engine, _storage) = engine_with(Arc::new(AcceptingOverlay));
        let err = engine
            .submit_payment(node("mallory"), node("bob"), usd(1_000), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_single_hop_payment_settles() {
        let (engine, storage) = engine_with(Arc::new(AcceptingOverlay));
        engine
            .register_channel(
                node("bob"),
                vec![Currency::Fiat(FiatCurrency::USD)],
                1_000_000,
                0.0,
                10,
                600,
            )
            .await
            .unwrap();

        let id = engine
            .submit_payment(node("alice"), node("bob"), usd(50_000), b"invoice-1".to_vec())
            .await
            .unwrap();

        let status = wait_for_state(&engine, &id, PaymentState::Settled).await;
        assert_eq!(status.attempt, 0);
        assert!(status.failure.is_none());

        let cascade = storage.get_cascade(&id).unwrap().unwrap();
        assert_eq!(cascade.hop_count(), 1);
        assert_eq!(cascade.locks[0].state, LockState::Claimed);
        assert_eq!(cascade.locks[0].peer, node("bob"));
    }

    #[tokio::test]
    async fn test_refused_acceptance_withdraws_the_payment() {
        let (engine, _storage) = engine_with(Arc::new(RefusingOverlay));
        engine
            .register_channel(
                node("bob"),
                vec![Currency::Fiat(FiatCurrency::USD)],
                1_000_000,
                0.0,
                10,
                600,
            )
            .await
            .unwrap();

        let id = engine
            .submit_payment(node("alice"), node("bob"), usd(2_000), Vec::new())
            .await
            .unwrap();

        let status = wait_for_state(&engine, &id, PaymentState::Cancelled).await;
        assert!(status.failure.as_deref().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn test_cancel_applies_directly_without_a_driver() {
        let (engine, storage) = engine_with(Arc::new(AcceptingOverlay));

        // No route: the record stays Created with no driver task.
        let _ = engine
            .submit_payment(node("alice"), node("bob"), usd(1_000), Vec::new())
            .await;
        let id = storage.payments().unwrap()[0].payment.id;

        engine.cancel_payment(&id).unwrap();
        let status = engine.get_payment_status(&id).unwrap();
        assert_eq!(status.state, PaymentState::Cancelled);

        // Cancelling again is a no-op.
        engine.cancel_payment(&id).unwrap();
    }

    #[tokio::test]
    async fn test_cancel_of_settled_payment_is_refused() {
        let (engine, _storage) = engine_with(Arc::new(AcceptingOverlay));
        engine
            .register_channel(
                node("bob"),
                vec![Currency::Fiat(FiatCurrency::USD)],
                1_000_000,
                0.0,
                10,
                600,
            )
            .await
            .unwrap();
        let id = engine
            .submit_payment(node("alice"), node("bob"), usd(500), Vec::new())
            .await
            .unwrap();
        wait_for_state(&engine, &id, PaymentState::Settled).await;

        let err = engine.cancel_payment(&id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_of_unknown_payment_is_not_found() {
        let (engine, _storage) = engine_with(Arc::new(AcceptingOverlay));
        let err = engine.get_payment_status(&Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, EngineError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_routes_reports_search_outcome() {
        let (engine, _storage) = engine_with(Arc::new(AcceptingOverlay));
        let search = engine.find_routes(&node("bob"), &usd(1_000)).await.unwrap();
        assert!(search.is_no_route());

        engine
            .register_channel(
                node("bob"),
                vec![Currency::Fiat(FiatCurrency::USD)],
                1_000_000,
                0.001,
                10,
                600,
            )
            .await
            .unwrap();
        match engine.find_routes(&node("bob"), &usd(1_000)).await.unwrap() {
            PathSearch::Found(paths) => {
                assert_eq!(paths.len(), 1);
                assert_eq!(paths[0].hop_count(), 1);
            }
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_channel_checkpoints_routes() {
        let (engine, storage) = engine_with(Arc::new(AcceptingOverlay));
        engine
            .register_channel(
                node("bob"),
                vec![Currency::Fiat(FiatCurrency::USD)],
                250_000,
                0.001,
                25,
                600,
            )
            .await
            .unwrap();

        let stored = storage.routes().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].destination, node("bob"));
        assert_eq!(stored[0].next_hop, node("alice"));
        // Trust was taken from the oracle, not defaulted.
        assert!((stored[0].trust_score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cascade_amounts_carry_downstream_fees() {
        let (engine, _storage) = engine_with(Arc::new(AcceptingOverlay));
        let mk = |dest: &str, via: &str, fee: f64| RouteEntry {
            destination: node(dest),
            next_hop: node(via),
            supported_currencies: vec![Currency::Fiat(FiatCurrency::USD)],
            liquidity: 10_000_000,
            fee_rate: fee,
            latency_ms: 10,
            trust_score: 0.9,
            expires_at: Utc::now() + chrono::Duration::seconds(600),
            hop_count: 1,
        };
        engine.table().upsert(mk("B", "alice", 0.01)).unwrap();
        engine.table().upsert(mk("C", "B", 0.02)).unwrap();

        let search = engine.find_routes(&node("C"), &usd(10_000)).await.unwrap();
        let paths = search.into_paths().unwrap();
        let payment = PaymentMessage::builder()
            .sender(node("alice"))
            .receiver(node("C"))
            .amount(usd(10_000))
            .build()
            .unwrap();
        let mut record = PaymentRecord::new(payment);
        record.candidates = paths;

        let cascade = engine
            .build_cascade(&record, &record.candidates[0], "internal")
            .unwrap();
        assert_eq!(cascade.hop_count(), 2);
        // First hop fronts the second hop's 2% fee on 10_000.
        assert_eq!(cascade.locks[0].amount.value, 10_200);
        assert_eq!(cascade.locks[1].amount.value, 10_000);
    }
}
