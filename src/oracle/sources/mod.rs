//! Price source implementations (Binance, Coinbase)

mod binance;
mod coinbase;

pub use binance::BinanceClient;
pub use coinbase::CoinbaseClient;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// Trait for price source clients
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Spot price of `currency` in USD
    async fn fetch(&self, currency: &str) -> Result<Decimal>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Parse an exchange price string, rejecting zero and negative values
pub(crate) fn parse_price(source: &str, raw: &str) -> Result<Decimal> {
    let price: Decimal = raw
        .trim()
        .parse()
        .with_context(|| format!("{} returned unparseable price '{}'", source, raw))?;
    if price <= Decimal::ZERO {
        anyhow::bail!("{} returned non-positive price {}", source, price);
    }
    Ok(price.normalize())
}
