//! Oracle Aggregator - Combines price data from multiple sources
//!
//! For every configured currency, asks all sources concurrently and takes the
//! median of the answers. Currencies with a fixed price (stablecoins) skip the
//! sources entirely.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::oracle::sources::PriceSource;
use crate::oracle::FetchPrices;
use crate::types::{PriceBatch, PricePoint};

/// Price aggregator that combines data from multiple sources
pub struct PriceAggregator {
    sources: Vec<Arc<dyn PriceSource>>,
    /// Currencies to fetch, in feed order
    currencies: Vec<String>,
    /// Pinned prices that bypass the sources
    fixed_prices: HashMap<String, Decimal>,
    /// Minimum number of sources that must answer per currency
    min_sources: usize,
}

impl PriceAggregator {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        currencies: Vec<String>,
        fixed_prices: HashMap<String, Decimal>,
        min_sources: usize,
    ) -> Self {
        Self {
            sources,
            currencies,
            fixed_prices,
            min_sources: min_sources.max(1),
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    async fn fetch_currency(&self, currency: &str) -> Result<Decimal> {
        if let Some(price) = self.fixed_prices.get(currency) {
            return Ok(*price);
        }

        let answers = join_all(self.sources.iter().map(|s| s.fetch(currency))).await;

        let mut prices = Vec::with_capacity(answers.len());
        for (source, answer) in self.sources.iter().zip(answers) {
            match answer {
                Ok(price) => prices.push(price),
                Err(e) => tracing::warn!(
                    source = %source.name(),
                    currency = %currency,
                    error = %e,
                    "source fetch failed"
                ),
            }
        }

        if prices.len() < self.min_sources {
            bail!(
                "{}: only {} of {} required sources answered",
                currency,
                prices.len(),
                self.min_sources
            );
        }

        median(&mut prices).ok_or_else(|| anyhow::anyhow!("{}: no prices", currency))
    }
}

#[async_trait]
impl FetchPrices for PriceAggregator {
    async fn fetch_prices(&self) -> Result<PriceBatch> {
        let mut points = Vec::with_capacity(self.currencies.len());
        for currency in &self.currencies {
            let price = self.fetch_currency(currency).await?;
            points.push(PricePoint::new(currency.clone(), price));
        }
        Ok(PriceBatch::new(points))
    }
}

/// Median of a non-empty set; mean of the two middle values for even sizes
fn median(prices: &mut [Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();
    let mid = prices.len() / 2;
    if prices.len() % 2 == 1 {
        Some(prices[mid])
    } else {
        Some(((prices[mid - 1] + prices[mid]) / Decimal::TWO).normalize())
    }
}
