use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Opaque overlay identity of a node. The transport layer decides what the
/// string actually is (a peer id, a public key fingerprint, a hostname);
/// this core just routes and settles between them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id, rejecting empty or whitespace-bearing strings.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidNodeId("empty node id".into()));
        }
        if id.chars().any(|c| c.is_whitespace()) {
            return Err(CoreError::InvalidNodeId(format!(
                "node id must not contain whitespace: {:?}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value in atomic units (centavos, satoshis, wei) of some currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Value in the smallest unit of the currency.
    pub value: u128,
    /// The currency of this amount.
    pub currency: Currency,
}

impl Amount {
    pub fn new(value: u128, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Sum two amounts of the same currency.
    pub fn checked_add(&self, other: &Amount) -> Result<Amount, CoreError> {
        if self.currency != other.currency {
            return Err(CoreError::InvalidAmount(format!(
                "currency mismatch: {} + {}",
                self.currency, other.currency
            )));
        }
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| CoreError::InvalidAmount("amount overflow".into()))?;
        Ok(Amount::new(value, self.currency.clone()))
    }

    /// Render as a decimal string in major units, e.g. 150_000 BRL centavos
    /// becomes "1500.00". Settlement rails take amounts in this form.
    pub fn to_decimal_string(&self) -> String {
        let decimals = self.currency.decimals();
        if decimals == 0 {
            return self.value.to_string();
        }
        let scale = 10u128.pow(decimals);
        let whole = self.value / scale;
        let frac = self.value % scale;
        format!("{}.{:0width$}", whole, frac, width = decimals as usize)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

/// Currencies a corridor can carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Fiat currency with ISO 4217 code.
    Fiat(FiatCurrency),
    /// Cryptocurrency.
    Crypto(CryptoCurrency),
    /// Arbitrary token identified by its ticker.
    Token(String),
}

impl Currency {
    /// Canonical ticker code.
    pub fn code(&self) -> String {
        match self {
            Currency::Fiat(fiat) => fiat.code().to_string(),
            Currency::Crypto(crypto) => crypto.code().to_string(),
            Currency::Token(code) => code.clone(),
        }
    }

    /// Number of decimal places in the atomic representation.
    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Fiat(fiat) => fiat.decimals(),
            Currency::Crypto(crypto) => crypto.decimals(),
            Currency::Token(_) => 6,
        }
    }

    /// Parse a ticker code, preferring the known fiat and crypto sets and
    /// falling back to a token.
    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        if code.is_empty() {
            return Err(CoreError::UnknownCurrency("empty code".into()));
        }
        if let Some(fiat) = FiatCurrency::from_code(code) {
            return Ok(Currency::Fiat(fiat));
        }
        if let Some(crypto) = CryptoCurrency::from_code(code) {
            return Ok(Currency::Crypto(crypto));
        }
        Ok(Currency::Token(code.to_string()))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// ISO 4217 fiat currencies of the launch corridors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiatCurrency {
    USD,
    EUR,
    GBP,
    JPY,
    BRL,
    INR,
    NGN,
    PHP,
}

impl FiatCurrency {
    /// ISO 4217 code.
    pub fn code(&self) -> &str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::JPY => "JPY",
            Self::BRL => "BRL",
            Self::INR => "INR",
            Self::NGN => "NGN",
            Self::PHP => "PHP",
        }
    }

    /// Number of decimal places.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Parse from ISO 4217 code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "JPY" => Some(Self::JPY),
            "BRL" => Some(Self::BRL),
            "INR" => Some(Self::INR),
            "NGN" => Some(Self::NGN),
            "PHP" => Some(Self::PHP),
            _ => None,
        }
    }
}

/// Cryptocurrencies with native rail support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CryptoCurrency {
    BTC,
    ETH,
    USDC,
    USDT,
}

impl CryptoCurrency {
    /// Currency symbol.
    pub fn code(&self) -> &str {
        match self {
            Self::BTC => "BTC",
            Self::ETH => "ETH",
            Self::USDC => "USDC",
            Self::USDT => "USDT",
        }
    }

    /// Number of decimal places.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::BTC => 8,
            Self::ETH => 18,
            Self::USDC | Self::USDT => 6,
        }
    }

    /// Parse from code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "BTC" => Some(Self::BTC),
            "ETH" => Some(Self::ETH),
            "USDC" => Some(Self::USDC),
            "USDT" => Some(Self::USDT),
            _ => None,
        }
    }
}

/// Routing hint carried inside a payment to guide path discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingHint {
    /// Node the hint applies to.
    pub target: NodeId,
    /// Preferred settlement layers, by layer id, in priority order.
    pub preferred_layers: Vec<String>,
    /// Maximum number of hops the sender will accept.
    pub max_hops: u32,
}
