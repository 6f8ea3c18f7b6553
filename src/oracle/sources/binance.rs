//! Binance REST client for spot ticker prices
//!
//! Uses `GET /api/v3/ticker/price?symbol=<SYM>USDT`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::oracle::sources::{http_client, parse_price, PriceSource};

const BINANCE_REST_URL: &str = "https://api.binance.com";
const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Clone, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BINANCE_REST_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn symbol(currency: &str) -> String {
        format!("{}{}", currency.to_uppercase(), QUOTE_ASSET)
    }

    fn parse_ticker(expected_symbol: &str, body: &str) -> Result<Decimal> {
        let ticker: TickerPrice =
            serde_json::from_str(body).context("Failed to parse Binance ticker response")?;
        if ticker.symbol != expected_symbol {
            bail!(
                "Binance answered for {} instead of {}",
                ticker.symbol,
                expected_symbol
            );
        }
        parse_price("Binance", &ticker.price)
    }
}

#[async_trait]
impl PriceSource for BinanceClient {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch(&self, currency: &str) -> Result<Decimal> {
        let symbol = Self::symbol(currency);
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await
            .context("Failed to fetch ticker from Binance")?;

        if !response.status().is_success() {
            bail!("Binance API returned error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read Binance ticker response")?;
        let price = Self::parse_ticker(&symbol, &body)?;

        tracing::trace!(source = %"Binance", currency = %currency, price = %price, "ticker");
        Ok(price)
    }
}
