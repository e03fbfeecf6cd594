use thiserror::Error;

use crate::state::PaymentState;

/// Errors produced by the core types and the payment lifecycle.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: PaymentState,
        to: PaymentState,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("payment {0} has expired")]
    PaymentExpired(uuid::Uuid),

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("config error: {0}")]
    Config(String),
}
