//! Oracle module - Price sourcing for the feeder
//!
//! Queries REST tickers from Binance and Coinbase and produces one
//! median-aggregated [`PriceBatch`] per fetch cycle.

mod aggregator;
pub mod sources;

pub use aggregator::PriceAggregator;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PriceBatch;

/// Fetch the current prices for every configured currency.
///
/// A fetch either yields the full batch or fails; partial batches are never
/// returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FetchPrices: Send + Sync {
    async fn fetch_prices(&self) -> Result<PriceBatch>;
}
