use std::time::Duration;

use async_trait::async_trait;

use corridor_core::{Amount, Currency};

use crate::error::SettlementError;
use crate::types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};

/// Settlement rail interface.
///
/// Each implementation bridges Corridor to a concrete rail: the in-process
/// ledger, a blockchain, a token contract, or anything else that can move
/// value between two addresses.
#[async_trait]
pub trait SettlementAdapter: Send + Sync {
    /// Submit a new settlement. Validates the request fail-fast and
    /// returns a result in `Pending` status.
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError>;

    /// Move a pending settlement to `Confirmed`.
    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError>;

    /// Move a pending settlement to `RolledBack`. Idempotent: rolling back
    /// an already rolled-back settlement returns the same terminal result
    /// with no side effects. A confirmed settlement is refused.
    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError>;

    /// Current status of a settlement on this rail.
    async fn get_status(&self, transaction_id: &str)
        -> Result<SettlementStatus, SettlementError>;

    /// Quote the cost of settling the given amount.
    async fn estimate_cost(&self, amount: &Amount) -> Result<CostEstimate, SettlementError>;

    /// Expected time to finality for the given amount.
    async fn estimate_latency(&self, amount: &Amount) -> Result<Duration, SettlementError>;

    /// Currencies this rail can settle.
    fn supported_currencies(&self) -> Vec<Currency>;

    /// Stable identifier of this rail, e.g. "bitcoin".
    fn layer_id(&self) -> &str;
}
