use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use corridor_core::{Amount, CryptoCurrency, Currency};

use crate::adapter::SettlementAdapter;
use crate::adapters::{tx_nonce, TxBook};
use crate::error::SettlementError;
use crate::types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};

/// Flat fee per transaction: 0.002 ETH in wei.
const FLAT_FEE_WEI: u128 = 2_000_000_000_000_000;
const GAS_FEE_WEI: u128 = 1_500_000_000_000_000;
const NETWORK_FEE_WEI: u128 = 500_000_000_000_000;
/// A handful of blocks of finality.
const CONFIRMATION_TIME: Duration = Duration::from_secs(180);

/// Simulated Ethereum rail. Rollback stands in for replacing a pending
/// transaction with a same-nonce cancel before inclusion.
pub struct EthereumAdapter {
    book: TxBook,
}

impl EthereumAdapter {
    pub fn new() -> Self {
        Self { book: TxBook::new() }
    }

    fn eth(value: u128) -> Amount {
        Amount::new(value, Currency::Crypto(CryptoCurrency::ETH))
    }
}

impl Default for EthereumAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementAdapter for EthereumAdapter {
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError> {
        request.validate()?;
        if request.amount.currency != Currency::Crypto(CryptoCurrency::ETH) {
            return Err(SettlementError::UnsupportedCurrency(
                request.amount.currency.code(),
            ));
        }

        let transaction_id = format!("0xeth_{}_{}", request.payment_id, tx_nonce());
        let result = SettlementResult {
            transaction_id: transaction_id.clone(),
            status: SettlementStatus::Pending,
            timestamp: Utc::now(),
            fee: Self::eth(FLAT_FEE_WEI),
            message: "transaction submitted to the Ethereum network".into(),
        };
        self.book.insert(result.clone());
        tracing::info!(%transaction_id, "ethereum settlement initiated");
        Ok(result)
    }

    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .confirm(transaction_id, "transaction confirmed on chain".into())?;
        tracing::info!(%transaction_id, "ethereum settlement confirmed");
        Ok(result)
    }

    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self.book.rollback(
            transaction_id,
            "transaction cancelled before inclusion".into(),
        )?;
        tracing::info!(%transaction_id, "ethereum settlement rolled back");
        Ok(result)
    }

    async fn get_status(
        &self,
        transaction_id: &str,
    ) -> Result<SettlementStatus, SettlementError> {
        self.book.status(transaction_id)
    }

    async fn estimate_cost(&self, _amount: &Amount) -> Result<CostEstimate, SettlementError> {
        Ok(CostEstimate {
            base_fee: Self::eth(GAS_FEE_WEI),
            network_fee: Self::eth(NETWORK_FEE_WEI),
            total_fee: Self::eth(FLAT_FEE_WEI),
            estimated_time: CONFIRMATION_TIME,
        })
    }

    async fn estimate_latency(&self, _amount: &Amount) -> Result<Duration, SettlementError> {
        Ok(CONFIRMATION_TIME)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![Currency::Crypto(CryptoCurrency::ETH)]
    }

    fn layer_id(&self) -> &str {
        "ethereum"
    }
}
