//! Coinbase REST client for spot prices
//!
//! Uses `GET /v2/prices/<SYM>-USD/spot`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::oracle::sources::{http_client, parse_price, PriceSource};

const COINBASE_REST_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Clone, Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Debug, Clone, Deserialize)]
struct SpotPrice {
    base: String,
    currency: String,
    amount: String,
}

#[derive(Debug, Clone)]
pub struct CoinbaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(COINBASE_REST_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn parse_spot(currency: &str, body: &str) -> Result<Decimal> {
        let spot: SpotResponse =
            serde_json::from_str(body).context("Failed to parse Coinbase spot response")?;
        if !spot.data.base.eq_ignore_ascii_case(currency) || spot.data.currency != "USD" {
            bail!(
                "Coinbase answered {}-{} instead of {}-USD",
                spot.data.base,
                spot.data.currency,
                currency
            );
        }
        parse_price("Coinbase", &spot.data.amount)
    }
}

#[async_trait]
impl PriceSource for CoinbaseClient {
    fn name(&self) -> &'static str {
        "Coinbase"
    }

    async fn fetch(&self, currency: &str) -> Result<Decimal> {
        let url = format!(
            "{}/v2/prices/{}-USD/spot",
            self.base_url,
            currency.to_uppercase()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch spot price from Coinbase")?;

        if !response.status().is_success() {
            bail!("Coinbase API returned error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read Coinbase spot response")?;
        let price = Self::parse_spot(currency, &body)?;

        tracing::trace!(source = %"Coinbase", currency = %currency, price = %price, "spot");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_spot_reads_amount() {
        let body = r#"{"data":{"base":"DOT","currency":"USD","amount":"6.512"}}"#;
        assert_eq!(CoinbaseClient::parse_spot("dot", body).unwrap(), dec!(6.512));
    }

    #[test]
    fn parse_spot_rejects_other_quote() {
        let body = r#"{"data":{"base":"DOT","currency":"EUR","amount":"6.0"}}"#;
        assert!(CoinbaseClient::parse_spot("DOT", body).is_err());
    }
}
