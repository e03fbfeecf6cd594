use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use corridor_core::{Amount, CryptoCurrency, Currency};

use crate::adapter::SettlementAdapter;
use crate::adapters::{tx_nonce, TxBook};
use crate::error::SettlementError;
use crate::types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};

/// Flat fee per transaction: 0.00005 BTC in satoshi.
const FLAT_FEE_SATS: u128 = 5_000;
const MINER_FEE_SATS: u128 = 3_000;
const NETWORK_FEE_SATS: u128 = 2_000;
/// Roughly one block.
const CONFIRMATION_TIME: Duration = Duration::from_secs(600);

/// Simulated Bitcoin rail.
///
/// Mirrors the shape of a real integration without touching a network:
/// broadcast yields a pending transaction, confirmation stands in for
/// block inclusion, and rollback stands in for replace-by-fee on a
/// not-yet-included transaction.
pub struct BitcoinAdapter {
    book: TxBook,
}

impl BitcoinAdapter {
    pub fn new() -> Self {
        Self { book: TxBook::new() }
    }

    fn btc(value: u128) -> Amount {
        Amount::new(value, Currency::Crypto(CryptoCurrency::BTC))
    }
}

impl Default for BitcoinAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementAdapter for BitcoinAdapter {
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError> {
        request.validate()?;
        if request.amount.currency != Currency::Crypto(CryptoCurrency::BTC) {
            return Err(SettlementError::UnsupportedCurrency(
                request.amount.currency.code(),
            ));
        }

        let transaction_id = format!("btc_{}_{}", request.payment_id, tx_nonce());
        let result = SettlementResult {
            transaction_id: transaction_id.clone(),
            status: SettlementStatus::Pending,
            timestamp: Utc::now(),
            fee: Self::btc(FLAT_FEE_SATS),
            message: "transaction broadcast to the Bitcoin network".into(),
        };
        self.book.insert(result.clone());
        tracing::info!(%transaction_id, "bitcoin settlement initiated");
        Ok(result)
    }

    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self.book.confirm(
            transaction_id,
            "transaction confirmed with 6 confirmations".into(),
        )?;
        tracing::info!(%transaction_id, "bitcoin settlement confirmed");
        Ok(result)
    }

    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .rollback(transaction_id, "transaction replaced by fee".into())?;
        tracing::info!(%transaction_id, "bitcoin settlement rolled back");
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
            base_fee: Self::btc(MINER_FEE_SATS),
            network_fee: Self::btc(NETWORK_FEE_SATS),
            total_fee: Self::btc(FLAT_FEE_SATS),
            estimated_time: CONFIRMATION_TIME,
        })
    }

    async fn estimate_latency(&self, _amount: &Amount) -> Result<Duration, SettlementError> {
        Ok(CONFIRMATION_TIME)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![Currency::Crypto(CryptoCurrency::BTC)]
    }

    fn layer_id(&self) -> &str {
        "bitcoin"
    }
}
