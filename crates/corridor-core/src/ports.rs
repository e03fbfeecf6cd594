use async_trait::async_trait;
use thiserror::Error;

use crate::types::NodeId;

/// Failures surfaced by the overlay transport.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("peer {0} is unreachable")]
    PeerUnreachable(NodeId),

    #[error("request to {0} timed out")]
    Timeout(NodeId),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// The gossip/messaging substrate this core runs on.
///
/// The embedding node wires in a concrete transport. Payload bytes are
/// opaque to the overlay; the core chooses its own payload encoding.
/// Inbound frames travel the other way: the embedder hands them to the
/// engine's frame handler and forwards the optional response.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Publish a payload to every subscriber of a topic.
    async fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), OverlayError>;

    /// Send a payload to one peer and wait for its response payload.
    async fn send(&self, peer: &NodeId, payload: Vec<u8>) -> Result<Vec<u8>, OverlayError>;
}

/// Source of peer trust, maintained outside this core.
///
/// Scores land in [0,1]. The engine reports an outcome for every peer it
/// settled through, after every attempt, so the oracle can learn.
#[async_trait]
pub trait TrustOracle: Send + Sync {
    async fn trust_score(&self, peer: &NodeId) -> f64;

    async fn report_outcome(&self, peer: &NodeId, success: bool);
}
