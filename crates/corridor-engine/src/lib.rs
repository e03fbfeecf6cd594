//! The embeddable payment engine tying routing to settlement.
//!
//! A [`PaymentEngine`] is constructed around three host-provided ports: an
//! overlay transport, a trust oracle and a storage backend. It owns the
//! route table, discovery, path selection and the settlement rails, and
//! drives each submitted payment through its lifecycle on a dedicated
//! task. Inbound traffic from the overlay is fed through
//! [`PaymentEngine::handle_broadcast`] and [`PaymentEngine::handle_frame`];
//! [`PaymentEngine::recover`] reconciles persisted state after a restart.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod recovery;
pub mod storage;
pub mod wire;

pub use engine::{PaymentEngine, PaymentStatus};
pub use error::EngineError;
pub use recovery::RecoveryReport;
pub use storage::{MemoryStorage, PaymentRecord, RocksDbStorage, Storage};
pub use wire::{PaymentAck, PaymentForward, PeerFrame};
