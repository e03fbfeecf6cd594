//! Concrete settlement rails.

pub mod bitcoin;
pub mod ethereum;
pub mod internal;
pub mod stablecoin;

pub use bitcoin::BitcoinAdapter;
pub use ethereum::EthereumAdapter;
pub use internal::InternalLedgerAdapter;
pub use stablecoin::StablecoinAdapter;

use chrono::Utc;
use dashmap::DashMap;

use crate::error::SettlementError;
use crate::types::{SettlementResult, SettlementStatus};

/// Per-rail transaction records with the shared status machine.
///
/// Every rail enforces the same transitions: Pending may confirm or roll
/// back, rollback of a rolled-back settlement is idempotent, and rollback
/// of a confirmed settlement is refused.
pub(crate) struct TxBook {
    transactions: DashMap<String, SettlementResult>,
}

impl TxBook {
    pub(crate) fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, result: SettlementResult) {
        self.transactions
            .insert(result.transaction_id.clone(), result);
    }

    pub(crate) fn result(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        self.transactions
            .get(transaction_id)
            .map(|r| r.clone())
            .ok_or_else(|| SettlementError::NotFound(transaction_id.to_string()))
    }

    pub(crate) fn status(&self, transaction_id: &str) -> Result<SettlementStatus, SettlementError> {
        Ok(self.result(transaction_id)?.status)
    }

    pub(crate) fn confirm(
        &self,
        transaction_id: &str,
        message: String,
    ) -> Result<SettlementResult, SettlementError> {
        let mut entry = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| SettlementError::NotFound(transaction_id.to_string()))?;
        let record = entry.value_mut();
        if record.status != SettlementStatus::Pending {
            return Err(SettlementError::InvalidTransition(format!(
                "cannot confirm settlement {} in status {}",
                transaction_id, record.status
            )));
        }
        record.status = SettlementStatus::Confirmed;
        record.timestamp = Utc::now();
        record.message = message;
        Ok(record.clone())
    }

    pub(crate) fn rollback(
        &self,
        transaction_id: &str,
        message: String,
    ) -> Result<SettlementResult, SettlementError> {
        let mut entry = self
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| SettlementError::NotFound(transaction_id.to_string()))?;
        let record = entry.value_mut();
        match record.status {
            SettlementStatus::Pending => {
                record.status = SettlementStatus::RolledBack;
                record.timestamp = Utc::now();
                record.message = message;
                Ok(record.clone())
            }
            // Idempotent: repeating a rollback returns the terminal result.
            SettlementStatus::RolledBack => Ok(record.clone()),
            SettlementStatus::Confirmed | SettlementStatus::Failed => {
                Err(SettlementError::InvalidTransition(format!(
                    "cannot roll back settlement {} in status {}",
                    transaction_id, record.status
                )))
            }
        }
    }
}

/// Monotonic-enough suffix for simulated backend transaction ids.
pub(crate) fn tx_nonce() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
