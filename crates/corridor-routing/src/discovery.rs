use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use corridor_core::ports::Overlay;
use corridor_core::{Currency, NodeId};

use crate::error::RoutingError;
use crate::table::{RouteEntry, RouteTable};

/// Broadcast topic carrying serialized [`RouteQuery`] payloads.
pub const ROUTE_QUERY_TOPIC: &str = "corridor.route-query";

/// Replies buffered per open window before backpressure drops them.
const REPLY_CHANNEL_CAPACITY: usize = 32;

/// A broadcast question: who can move `amount` of `currency` to
/// `destination`?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteQuery {
    pub request_id: Uuid,
    pub origin: NodeId,
    pub destination: NodeId,
    pub currency: Currency,
    pub amount: u128,
    pub max_hops: u32,
}

/// One responder-relative route in a reply. The requester records it as an
/// edge from the responder to the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOffer {
    pub destination: NodeId,
    pub currencies: Vec<Currency>,
    pub liquidity: u128,
    pub fee_rate: f64,
    pub latency_ms: u64,
    pub ttl_secs: u32,
    pub hop_count: u32,
}

/// Directed answer to a [`RouteQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReply {
    pub request_id: Uuid,
    pub responder: NodeId,
    pub offers: Vec<RouteOffer>,
}

/// Removes the pending-window registration even when the collecting future
/// is dropped mid-wait.
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, mpsc::Sender<RouteReply>>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Route discovery over the overlay.
///
/// `collect` broadcasts a query and gathers replies for a fixed window;
/// `deliver` is the inbound half, called by the frame handler when a reply
/// arrives. Replies landing after the window closes are dropped.
pub struct Discovery {
    node_id: NodeId,
    overlay: Arc<dyn Overlay>,
    pending: DashMap<Uuid, mpsc::Sender<RouteReply>>,
    window: Duration,
}

impl Discovery {
    pub fn new(node_id: NodeId, overlay: Arc<dyn Overlay>, window: Duration) -> Self {
        Self {
            node_id,
            overlay,
            pending: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Broadcast a query and gather every reply delivered inside the window.
    pub async fn collect(
        &self,
        destination: &NodeId,
        currency: &Currency,
        amount: u128,
        max_hops: u32,
    ) -> Result<Vec<RouteReply>, RoutingError> {
        let request_id = Uuid::now_v7();
        let query = RouteQuery {
            request_id,
            origin: self.node_id.clone(),
            destination: destination.clone(),
            currency: currency.clone(),
            amount,
            max_hops,
        };

        let (tx, mut rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        self.pending.insert(request_id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request_id,
        };

        let payload =
            serde_json::to_vec(&query).map_err(|e| RoutingError::Discovery(e.to_string()))?;
        self.overlay
            .broadcast(ROUTE_QUERY_TOPIC, payload)
            .await
            .map_err(|e| RoutingError::Discovery(e.to_string()))?;

        let mut replies = Vec::new();
        let window = tokio::time::sleep(self.window);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                received = rx.recv() => match received {
                    Some(reply) => replies.push(reply),
                    None => break,
                },
            }
        }

        tracing::debug!(%destination, count = replies.len(), "route discovery window closed");
        Ok(replies)
    }

    /// Hand an inbound reply to its open window. Returns false when the
    /// window already closed and the reply was dropped.
    pub fn deliver(&self, reply: RouteReply) -> bool {
        match self.pending.get(&reply.request_id) {
            Some(tx) => tx.try_send(reply).is_ok(),
            None => {
                tracing::trace!(request_id = %reply.request_id, "late route reply dropped");
                false
            }
        }
    }
}

/// Build this node's answer to a peer's query from its own table.
///
/// Offers re-advertise known routes with the hop count bumped by one, so
/// the requester sees the true distance through this responder. Returns
/// `None` when there is nothing useful to say.
pub fn answer_query(
    table: &RouteTable,
    query: &RouteQuery,
    responder: &NodeId,
) -> Option<RouteReply> {
    if query.origin == *responder {
        return None;
    }
    let now = Utc::now();
    let offers: Vec<RouteOffer> = table
        .lookup_at(&query.destination, &query.currency, now)
        .into_iter()
        .filter(|entry| entry.liquidity >= query.amount)
        .filter(|entry| entry.hop_count + 1 <= query.max_hops)
        .map(|entry| {
            let remaining = (entry.expires_at - now).num_seconds().max(1) as u32;
            RouteOffer {
                destination: entry.destination,
                currencies: entry.supported_currencies,
                liquidity: entry.liquidity,
                fee_rate: entry.fee_rate,
                latency_ms: entry.latency_ms,
                ttl_secs: remaining,
                hop_count: entry.hop_count + 1,
            }
        })
        .collect();

    if offers.is_empty() {
        return None;
    }
    Some(RouteReply {
        request_id: query.request_id,
        responder: responder.clone(),
        offers,
    })
}

/// Fold a reply into the table as edges out of the responder. Trust comes
/// from the caller's oracle, never from the wire. Returns how many entries
/// were recorded.
pub fn ingest_reply(
    table: &RouteTable,
    reply: &RouteReply,
    trust_score: f64,
    max_hops: u32,
) -> usize {
    let now = Utc::now();
    let mut recorded = 0;
    for offer in &reply.offers {
        if offer.destination == reply.responder {
            tracing::trace!(responder = %reply.responder, "skipping self-loop offer");
            continue;
        }
        if offer.hop_count > max_hops {
            continue;
        }
        let entry = RouteEntry {
            destination: offer.destination.clone(),
            next_hop: reply.responder.clone(),
            supported_currencies: offer.currencies.clone(),
            liquidity: offer.liquidity,
            fee_rate: offer.fee_rate,
            latency_ms: offer.latency_ms,
            trust_score,
            expires_at: now + chrono::Duration::seconds(i64::from(offer.ttl_secs)),
            hop_count: offer.hop_count,
        };
        match table.upsert(entry) {
            Ok(_) => recorded += 1,
            Err(err) => {
                tracing::debug!(responder = %reply.responder, %err, "discarding bad offer");
            }
        }
    }
    tracing::debug!(responder = %reply.responder, recorded, "ingested route reply");
    recorded
}
