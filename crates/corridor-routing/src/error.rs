use thiserror::Error;

/// Errors raised by the routing layer.
///
/// An unreachable destination is not represented here: path selection
/// reports that as a [`crate::pathfinder::PathSearch::NoRoute`] value, and
/// only the payment submission surface turns it into an error.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid route entry: {reason}")]
    InvalidEntry { reason: String },

    #[error("scoring weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },

    #[error("invalid advertisement: {reason}")]
    InvalidAdvertisement { reason: String },

    #[error("discovery failed: {0}")]
    Discovery(String),
}
