use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use corridor_core::{Amount, CryptoCurrency, Currency};

use crate::adapter::SettlementAdapter;
use crate::adapters::{tx_nonce, TxBook};
use crate::error::SettlementError;
use crate::types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};

/// Flat fee per transfer: 0.003 in token minor units (6 decimals).
const FLAT_FEE_UNITS: u128 = 3_000;
const GAS_FEE_UNITS: u128 = 2_000;
const NETWORK_FEE_UNITS: u128 = 1_000;
const CONFIRMATION_TIME: Duration = Duration::from_secs(300);

const USDC_CONTRACT: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
const USDT_CONTRACT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

/// Simulated ERC-20 stablecoin rail for USDC and USDT.
///
/// Transfers go through the token contract mapped to the currency;
/// anything without a contract entry is rejected up front.
pub struct StablecoinAdapter {
    book: TxBook,
    contracts: Vec<(Currency, &'static str)>,
}

impl StablecoinAdapter {
    pub fn new() -> Self {
        Self {
            book: TxBook::new(),
            contracts: vec![
                (Currency::Crypto(CryptoCurrency::USDC), USDC_CONTRACT),
                (Currency::Crypto(CryptoCurrency::USDT), USDT_CONTRACT),
            ],
        }
    }

    /// Contract address for a supported token.
    pub fn token_contract(&self, currency: &Currency) -> Option<&'static str> {
        self.contracts
            .iter()
            .find(|(c, _)| c == currency)
            .map(|(_, address)| *address)
    }

    fn ensure_supported(&self, currency: &Currency) -> Result<(), SettlementError> {
        if self.token_contract(currency).is_none() {
            return Err(SettlementError::UnsupportedCurrency(format!(
                "{} (supported: USDC, USDT)",
                currency.code()
            )));
        }
        Ok(())
    }

    fn fee(currency: &Currency, value: u128) -> Amount {
        Amount::new(value, currency.clone())
    }
}

impl Default for StablecoinAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementAdapter for StablecoinAdapter {
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError> {
        request.validate()?;
        let currency = request.amount.currency.clone();
        self.ensure_supported(&currency)?;

        let code = currency.code();
        let transaction_id = format!("0xsc_{}_{}_{}", code, request.payment_id, tx_nonce());
        let result = SettlementResult {
            transaction_id: transaction_id.clone(),
            status: SettlementStatus::Pending,
            timestamp: Utc::now(),
            fee: Self::fee(&currency, FLAT_FEE_UNITS),
            message: format!("{} transfer submitted to the network", code),
        };
        self.book.insert(result.clone());
        tracing::info!(%transaction_id, token = %code, "stablecoin settlement initiated");
        Ok(result)
    }

    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .confirm(transaction_id, "transfer confirmed on chain".into())?;
        tracing::info!(%transaction_id, "stablecoin settlement confirmed");
        Ok(result)
    }

    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .rollback(transaction_id, "transfer cancelled before inclusion".into())?;
        tracing::info!(%transaction_id, "stablecoin settlement rolled back");
        Ok(result)
    }

    async fn get_status(
        &self,
        transaction_id: &str,
    ) -> Result<SettlementStatus, SettlementError> {
        self.book.status(transaction_id)
    }

    async fn estimate_cost(&self, amount: &Amount) -> Result<CostEstimate, SettlementError> {
        self.ensure_supported(&amount.currency)?;
        Ok(CostEstimate {
            base_fee: Self::fee(&amount.currency, GAS_FEE_UNITS),
            network_fee: Self::fee(&amount.currency, NETWORK_FEE_UNITS),
            total_fee: Self::fee(&amount.currency, FLAT_FEE_UNITS),
            estimated_time: CONFIRMATION_TIME,
        })
    }

    async fn estimate_latency(&self, amount: &Amount) -> Result<Duration, SettlementError> {
        self.ensure_supported(&amount.currency)?;
        Ok(CONFIRMATION_TIME)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        self.contracts.iter().map(|(c, _)| c.clone()).collect()
    }

    fn layer_id(&self) -> &str {
        "stablecoin"
    }
}
