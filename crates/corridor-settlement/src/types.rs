use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use corridor_core::Amount;

use crate::error::SettlementError;

/// Parameters for moving value across one settlement rail.
///
/// `lock_expiry` is set by the HTLC engine for hop locks and absent for
/// direct single-hop settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub payment_id: Uuid,
    pub amount: Amount,
    pub from_address: String,
    pub to_address: String,
    pub lock_expiry: Option<DateTime<Utc>>,
}

impl SettlementRequest {
    /// Fail-fast check adapters run before touching any backend state.
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.payment_id.is_nil() {
            return Err(SettlementError::InvalidRequest(
                "payment id must not be nil".into(),
            ));
        }
        if self.amount.is_zero() {
            return Err(SettlementError::InvalidRequest(
                "amount must be positive".into(),
            ));
        }
        if self.from_address.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(
                "source address is required".into(),
            ));
        }
        if self.to_address.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(
                "destination address is required".into(),
            ));
        }
        Ok(())
    }
}

/// The lifecycle status of a settlement on its rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Submitted and awaiting confirmation.
    Pending,
    /// Confirmed on the underlying rail.
    Confirmed,
    /// Failed on the rail, non-recoverable.
    Failed,
    /// Reversed before confirmation.
    RolledBack,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Failed => write!(f, "Failed"),
            Self::RolledBack => write!(f, "RolledBack"),
        }
    }
}

/// Outcome of one settlement operation. Only the adapter that issued the
/// result mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    /// Backend transaction reference.
    pub transaction_id: String,
    pub status: SettlementStatus,
    pub timestamp: DateTime<Utc>,
    /// Fee charged by the rail, in the rail's currency.
    pub fee: Amount,
    /// Human-readable note from the rail.
    pub message: String,
}

/// Cost breakdown a rail quotes before settling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub base_fee: Amount,
    pub network_fee: Amount,
    pub total_fee: Amount,
    pub estimated_time: Duration,
}
