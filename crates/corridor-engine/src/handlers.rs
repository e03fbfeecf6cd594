//! Inbound message handling. The embedder's transport feeds broadcasts and
//! directed frames here; replies come back as encoded frames for it to send.

use corridor_core::{NodeId, PaymentMessage};
use corridor_routing::{
    answer_query, apply_advertisement, RouteAdvertisement, RouteQuery, ADVERT_TOPIC,
    ROUTE_QUERY_TOPIC,
};

use crate::engine::PaymentEngine;
use crate::error::EngineError;
use crate::wire::{PaymentAck, PeerFrame};

impl PaymentEngine {
    /// Handle a gossip message. Route queries are answered with a directed
    /// reply to the origin; advertisements are folded into the route table
    /// with trust taken from this node's oracle.
    pub async fn handle_broadcast(&self, topic: &str, payload: &[u8]) -> Result<(), EngineError> {
        match topic {
            ROUTE_QUERY_TOPIC => {
                let query: RouteQuery = serde_json::from_slice(payload)?;
                let Some(reply) = answer_query(&self.table, &query, &self.node_id) else {
                    return Ok(());
                };
                let origin = query.origin;
                let frame = PeerFrame::RouteReply(reply).encode()?;
                if let Err(err) = self.overlay.send(&origin, frame).await {
                    tracing::debug!(origin = %origin, %err, "route reply undeliverable");
                }
                Ok(())
            }
            ADVERT_TOPIC => {
                let advert: RouteAdvertisement = serde_json::from_slice(payload)?;
                let trust = self.oracle.trust_score(&advert.origin).await;
                let recorded = apply_advertisement(
                    &self.table,
                    &advert,
                    &self.node_id,
                    trust,
                    self.config.max_hops,
                )?;
                if recorded > 0 {
                    self.checkpoint_routes()?;
                }
                Ok(())
            }
            other => {
                tracing::debug!(topic = other, "unknown broadcast topic ignored");
                Ok(())
            }
        }
    }

    /// Handle a directed frame from a peer. Returns the encoded response
    /// frame when the protocol calls for one.
    pub fn handle_frame(
        &self,
        from: &NodeId,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, EngineError> {
        match PeerFrame::decode(payload)? {
            PeerFrame::RouteReply(reply) => {
                self.discovery.deliver(reply);
                Ok(None)
            }
            PeerFrame::PaymentForward(forward) => {
                let ack = self.acceptance_for(&forward.payment);
                Ok(Some(PeerFrame::PaymentAck(ack).encode()?))
            }
            PeerFrame::PaymentAck(ack) => {
                // Acks normally arrive as send() responses; one showing up
                // here has no pending request behind it.
                tracing::debug!(from = %from, payment_id = %ack.payment_id, "stray ack ignored");
                Ok(None)
            }
        }
    }

    /// Receiver-side acceptance policy for an incoming payment.
    fn acceptance_for(&self, payment: &PaymentMessage) -> PaymentAck {
        if payment.receiver != self.node_id {
            return PaymentAck::refuse(payment.id, "not addressed to this node");
        }
        if let Err(err) = payment.validate() {
            return PaymentAck::refuse(payment.id, err.to_string());
        }
        if payment.is_expired() {
            return PaymentAck::refuse(payment.id, "payment expired");
        }
        tracing::info!(
            payment_id = %payment.id,
            sender = %payment.sender,
            amount = %payment.amount,
            "incoming payment accepted"
        );
        PaymentAck::accept(payment.id)
    }
}
