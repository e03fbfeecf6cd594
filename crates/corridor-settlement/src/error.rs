use uuid::Uuid;

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement not found: {0}")]
    NotFound(String),

    #[error("adapter not registered: {0}")]
    AdapterNotFound(String),

    #[error("no adapter settles currency {0}")]
    NoAdapterForCurrency(String),

    #[error("invalid settlement request: {0}")]
    InvalidRequest(String),

    #[error("invalid settlement state transition: {0}")]
    InvalidTransition(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("invalid cascade: {0}")]
    InvalidCascade(String),

    #[error("preimage does not match commitment for payment {0}")]
    PreimageMismatch(Uuid),

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("backend failure: {0}")]
    Backend(String),
}
