use thiserror::Error;
use uuid::Uuid;

use corridor_core::{CoreError, NodeId, OverlayError};
use corridor_routing::{NoRouteReason, RoutingError};
use corridor_settlement::SettlementError;

/// Errors surfaced at the engine's public edge.
///
/// Below this surface, no-route and per-hop settlement failures are values,
/// not errors; they only become an `Err` when the caller asked for something
/// the engine cannot do at all.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no route to {destination}: {reason}")]
    NoRoute {
        destination: NodeId,
        reason: NoRouteReason,
    },

    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("overlay failure: {0}")]
    Overlay(#[from] OverlayError),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("codec failure: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
