use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use corridor_core::{Amount, CryptoCurrency, Currency, FiatCurrency};

use crate::adapter::SettlementAdapter;
use crate::adapters::{tx_nonce, TxBook};
use crate::error::SettlementError;
use crate::types::{CostEstimate, SettlementRequest, SettlementResult, SettlementStatus};

/// A single double-entry posting.
#[derive(Debug, Clone)]
struct LedgerEntry {
    account: String,
    /// Positive = credit, negative = debit.
    delta: i128,
    transaction_id: String,
    currency: Currency,
}

/// In-process, zero-cost settlement rail.
///
/// Keeps an in-memory double-entry ledger. `initiate` only records the
/// pending transfer; balances move when the transfer is confirmed, so a
/// rollback before confirmation has nothing to reverse.
pub struct InternalLedgerAdapter {
    book: TxBook,
    requests: DashMap<String, SettlementRequest>,
    ledger: DashMap<Uuid, LedgerEntry>,
    /// `(address, currency code)` -> signed balance.
    balances: DashMap<String, i128>,
}

impl InternalLedgerAdapter {
    pub fn new() -> Self {
        Self {
            book: TxBook::new(),
            requests: DashMap::new(),
            ledger: DashMap::new(),
            balances: DashMap::new(),
        }
    }

    fn balance_key(address: &str, currency: &Currency) -> String {
        format!("{}:{}", address, currency.code())
    }

    pub fn balance(&self, address: &str, currency: &Currency) -> i128 {
        self.balances
            .get(&Self::balance_key(address, currency))
            .map(|b| *b)
            .unwrap_or(0)
    }

    /// Postings recorded for one transaction, as `(account, delta,
    /// currency)` triples. A confirmed transfer always sums to zero.
    pub fn audit(&self, transaction_id: &str) -> Vec<(String, i128, Currency)> {
        self.ledger
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .map(|e| (e.account.clone(), e.delta, e.currency.clone()))
            .collect()
    }

    /// Post the debit/credit pair for a confirmed transfer.
    fn post_entries(&self, transaction_id: &str, request: &SettlementRequest) {
        // initiate refuses amounts outside the ledger's signed range
        let Ok(value) = i128::try_from(request.amount.value) else {
            return;
        };
        let currency = request.amount.currency.clone();

        self.ledger.insert(
            Uuid::now_v7(),
            LedgerEntry {
                account: request.from_address.clone(),
                delta: -value,
                transaction_id: transaction_id.to_string(),
                currency: currency.clone(),
            },
        );
        self.ledger.insert(
            Uuid::now_v7(),
            LedgerEntry {
                account: request.to_address.clone(),
                delta: value,
                transaction_id: transaction_id.to_string(),
                currency: currency.clone(),
            },
        );

        self.balances
            .entry(Self::balance_key(&request.from_address, &currency))
            .and_modify(|b| *b -= value)
            .or_insert(-value);
        self.balances
            .entry(Self::balance_key(&request.to_address, &currency))
            .and_modify(|b| *b += value)
            .or_insert(value);
    }
}

impl Default for InternalLedgerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementAdapter for InternalLedgerAdapter {
    async fn initiate(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, SettlementError> {
        request.validate()?;
        if i128::try_from(request.amount.value).is_err() {
            return Err(SettlementError::InvalidRequest(
                "amount exceeds the ledger's signed range".into(),
            ));
        }

        let transaction_id = format!("int_{}_{}", request.payment_id, tx_nonce());
        let result = SettlementResult {
            transaction_id: transaction_id.clone(),
            status: SettlementStatus::Pending,
            timestamp: Utc::now(),
            fee: Amount::new(0, request.amount.currency.clone()),
            message: "transfer recorded on the internal ledger".into(),
        };
        self.book.insert(result.clone());
        self.requests.insert(transaction_id.clone(), request);
        tracing::info!(%transaction_id, "internal settlement initiated");
        Ok(result)
    }

    async fn confirm(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .confirm(transaction_id, "transfer posted to both accounts".into())?;
        if let Some(request) = self.requests.get(transaction_id) {
            self.post_entries(transaction_id, &request);
        }
        tracing::info!(%transaction_id, "internal settlement confirmed");
        Ok(result)
    }

    async fn rollback(&self, transaction_id: &str) -> Result<SettlementResult, SettlementError> {
        let result = self
            .book
            .rollback(transaction_id, "pending transfer discarded".into())?;
        tracing::info!(%transaction_id, "internal settlement rolled back");
        Ok(result)
    }

    async fn get_status(
        &self,
        transaction_id: &str,
    ) -> Result<SettlementStatus, SettlementError> {
        self.book.status(transaction_id)
    }

    async fn estimate_cost(&self, amount: &Amount) -> Result<CostEstimate, SettlementError> {
        let zero = Amount::new(0, amount.currency.clone());
        Ok(CostEstimate {
            base_fee: zero.clone(),
            network_fee: zero.clone(),
            total_fee: zero,
            estimated_time: Duration::ZERO,
        })
    }

    async fn estimate_latency(&self, _amount: &Amount) -> Result<Duration, SettlementError> {
        Ok(Duration::ZERO)
    }

    fn supported_currencies(&self) -> Vec<Currency> {
        vec![
            Currency::Fiat(FiatCurrency::USD),
            Currency::Fiat(FiatCurrency::EUR),
            Currency::Fiat(FiatCurrency::GBP),
            Currency::Fiat(FiatCurrency::JPY),
            Currency::Fiat(FiatCurrency::BRL),
            Currency::Fiat(FiatCurrency::INR),
            Currency::Fiat(FiatCurrency::NGN),
            Currency::Fiat(FiatCurrency::PHP),
            Currency::Crypto(CryptoCurrency::BTC),
            Currency::Crypto(CryptoCurrency::ETH),
            Currency::Crypto(CryptoCurrency::USDC),
            Currency::Crypto(CryptoCurrency::USDT),
        ]
    }

    fn layer_id(&self) -> &str {
        "internal"
    }
}
