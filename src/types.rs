//! Core types used throughout the feeder
//!
//! Defines price points, batches, account identities and on-chain currency ids.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observed price for one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Token symbol (e.g. "DOT", "AUSD")
    pub currency: String,
    /// Price quoted in USD
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(currency: impl Into<String>, price: Decimal) -> Self {
        Self {
            currency: currency.into(),
            price,
        }
    }

    /// Parse a price given as a decimal string
    pub fn parse(currency: impl Into<String>, price: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Self::new(currency, price.trim().parse::<Decimal>()?))
    }
}

impl fmt::Display for PricePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.currency, self.price)
    }
}

/// All price points fetched in one cycle, in fetch order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBatch {
    /// Fetch time (ms since epoch)
    pub ts: i64,
    pub points: Vec<PricePoint>,
}

impl PriceBatch {
    pub fn new(points: Vec<PricePoint>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, currency: &str) -> Option<&PricePoint> {
        self.points.iter().find(|p| p.currency == currency)
    }
}

/// On-chain account identity (SS58 address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Currency identifier as understood by the oracle pallet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyId {
    Token(String),
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyId::Token(symbol) => write!(f, "Token:{}", symbol),
        }
    }
}
