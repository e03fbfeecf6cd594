use serde::{Deserialize, Serialize};
use uuid::Uuid;

use corridor_core::PaymentMessage;
use corridor_routing::RouteReply;

use crate::error::EngineError;

/// A payment handed to its destination node for acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentForward {
    pub payment: PaymentMessage,
}

/// The receiver's answer to a [`PaymentForward`]. `accepted == false`
/// carries the refusal reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAck {
    pub payment_id: Uuid,
    pub accepted: bool,
    pub reason: Option<String>,
}

impl PaymentAck {
    pub fn accept(payment_id: Uuid) -> Self {
        Self {
            payment_id,
            accepted: true,
            reason: None,
        }
    }

    pub fn refuse(payment_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            payment_id,
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Everything that travels peer-to-peer over `Overlay::send`.
///
/// Broadcast topics carry bare [`RouteQuery`](corridor_routing::RouteQuery)
/// and [`RouteAdvertisement`](corridor_routing::RouteAdvertisement) payloads
/// and are dispatched by topic instead of by tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerFrame {
    RouteReply(RouteReply),
    PaymentForward(PaymentForward),
    PaymentAck(PaymentAck),
}

impl PeerFrame {
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, EngineError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
