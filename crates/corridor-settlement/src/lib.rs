//! Settlement rails and the HTLC cascade engine.
//!
//! A [`SettlementAdapter`] wraps one settlement layer behind a uniform
//! initiate/confirm/rollback surface; the [`SettlementRegistry`] holds the
//! registered rails and picks one per currency. Multi-hop payments run as an
//! [`HtlcCascade`] of per-hop locks with strictly decreasing expiries,
//! driven to a terminal [`CascadeOutcome`] by the [`HtlcEngine`]: lock
//! sender to receiver, claim receiver to sender, roll back everything still
//! locked on any failure.

pub mod adapter;
pub mod adapters;
pub mod engine;
pub mod error;
pub mod htlc;
pub mod registry;
pub mod types;

pub use adapter::SettlementAdapter;
pub use adapters::{
    BitcoinAdapter, EthereumAdapter, InternalLedgerAdapter, StablecoinAdapter,
};
pub use engine::{CascadeOutcome, FailureReason, HtlcConfig, HtlcEngine};
pub use error::SettlementError;
pub use htlc::{HopLock, HtlcCascade, LockState};
pub use registry::SettlementRegistry;
pub use types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};
