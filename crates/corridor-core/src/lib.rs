//! Corridor core — shared vocabulary of the payment network.
//!
//! This crate holds what every other corridor crate speaks:
//! - [`NodeId`], [`Amount`], [`Currency`] and friends in [`types`].
//! - [`PaymentMessage`] and its builder in [`payment`].
//! - The payment lifecycle ([`PaymentState`], [`PaymentEvent`],
//!   [`state::advance`]) in [`state`].
//! - Collaborator ports ([`Overlay`], [`TrustOracle`]) in [`ports`].
//! - Node-level configuration in [`config`].

pub mod config;
pub mod error;
pub mod payment;
pub mod ports;
pub mod state;
pub mod types;

pub use config::NodeConfig;
pub use error::CoreError;
pub use payment::{PaymentBuilder, PaymentMessage};
pub use ports::{Overlay, OverlayError, TrustOracle};
pub use state::{PaymentEvent, PaymentState};
pub use types::{Amount, CryptoCurrency, Currency, FiatCurrency, NodeId, RoutingHint};
