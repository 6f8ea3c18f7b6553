//! Configuration management for the feeder
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Longest accepted `feeder.interval_ms` (one week)
pub const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Longest accepted heartbeat dead period (thirty days)
pub const MAX_DEAD_PERIOD_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Currency symbol as the aggregator and the pins see it
pub fn normalize_currency(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSection,
    pub log: LogConfig,
    pub feeder: FeederConfig,
    pub oracle: OracleConfig,
    pub operator: OperatorConfig,
    pub chain: ChainConfig,
    pub sources: SourcesConfig,
    pub health: HealthConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// "production" switches logs to JSON
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default level (trace, debug, info, warn, error)
    pub level: String,
    /// Extra filter directives (e.g. "oracle_feeder::chain=debug")
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeederConfig {
    /// Fetch/feed interval in milliseconds
    pub interval_ms: u64,
    /// Fetch once at startup instead of waiting one interval
    pub immediately: bool,
    /// Heartbeat dead period as a multiple of the interval
    pub dead_period_multiplier: u32,
    /// How long a never-alive heartbeat still reports live after startup
    pub startup_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Oracle identifier, e.g. "acala" -> acalaOracle / operatorMembershipAcala
    pub name: String,
    /// Token symbols to feed, in feed order
    pub currencies: Vec<String>,
    /// Fixed-point decimals of the oracle pallet
    pub scale_decimals: u32,
    /// Pinned prices as decimal strings (e.g. AUSD: "1.00")
    #[serde(default)]
    pub fixed_prices: HashMap<String, String>,
}

#[derive(Clone, Deserialize)]
pub struct OperatorConfig {
    /// Operator account address as listed in the membership pallet.
    /// The gateway signs with the keystore entry for this account.
    pub address: String,
    /// Inline signing secret. Refused by `validate`; never printed.
    #[serde(default)]
    pub key_uri: Option<String>,
}

impl OperatorConfig {
    fn has_inline_key(&self) -> bool {
        self.key_uri.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("address", &self.address)
            .field("key_uri", &self.key_uri.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Signing gateway JSON-RPC endpoint
    pub endpoint: String,
    pub request_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub binance_enabled: bool,
    pub coinbase_enabled: bool,
    /// Minimum sources that must answer per currency
    pub min_sources: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Fan prices out to the secondary strategy
    pub enabled: bool,
    /// Move (in percent) between cycles that counts as a signal
    pub threshold_pct: f64,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("app.env", "development")?
            .set_default("log.level", "info")?
            // Feeder defaults
            .set_default("feeder.interval_ms", 60_000)?
            .set_default("feeder.immediately", true)?
            .set_default("feeder.dead_period_multiplier", 4)?
            .set_default("feeder.startup_grace_ms", 120_000)?
            // Oracle defaults
            .set_default("oracle.name", "acala")?
            .set_default("oracle.currencies", vec!["DOT", "BTC", "ETH"])?
            .set_default("oracle.scale_decimals", i64::from(DEFAULT_SCALE_DECIMALS))?
            // Operator has no usable default
            .set_default("operator.address", "")?
            // Chain gateway defaults
            .set_default("chain.endpoint", "http://127.0.0.1:9955")?
            .set_default("chain.request_timeout_ms", 10_000)?
            .set_default("chain.confirmation_timeout_ms", 120_000)?
            .set_default("chain.poll_interval_ms", 2_000)?
            // Source defaults
            .set_default("sources.binance_enabled", true)?
            .set_default("sources.coinbase_enabled", true)?
            .set_default("sources.min_sources", 1)?
            .set_default("sources.request_timeout_ms", 5_000)?
            // Health defaults
            .set_default("health.port", 3000)?
            // Strategy defaults
            .set_default("strategy.enabled", false)?
            .set_default("strategy.threshold_pct", 1.0)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FEEDER_*)
            .add_source(
                Environment::with_prefix("FEEDER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("oracle.currencies")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.feeder.interval_ms)
    }

    /// Heartbeat dead period (interval x multiplier), saturating
    pub fn dead_period(&self) -> Duration {
        self.interval()
            .checked_mul(self.feeder.dead_period_multiplier.max(1))
            .unwrap_or(Duration::MAX)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.feeder.startup_grace_ms)
    }

    pub fn oracle_names(&self) -> Result<OracleNames> {
        OracleNames::derive(&self.oracle.name)
    }

    /// Parsed `oracle.fixed_prices`
    pub fn fixed_prices(&self) -> Result<HashMap<String, rust_decimal::Decimal>> {
        self.oracle
            .fixed_prices
            .iter()
            .map(|(currency, raw)| {
                let price = raw
                    .trim()
                    .parse::<rust_decimal::Decimal>()
                    .with_context(|| format!("oracle.fixed_prices.{} is not a decimal", currency))?;
                Ok((normalize_currency(currency), price))
            })
            .collect()
    }

    /// Check everything that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.oracle_names()?;
        self.fixed_prices()?;

        if self.feeder.interval_ms == 0 {
            bail!("feeder.interval_ms must be greater than zero");
        }
        if self.feeder.interval_ms > MAX_INTERVAL_MS {
            bail!("feeder.interval_ms must be at most {}", MAX_INTERVAL_MS);
        }
        let dead_period_ms = self
            .feeder
            .interval_ms
            .checked_mul(u64::from(self.feeder.dead_period_multiplier.max(1)))
            .filter(|ms| *ms <= MAX_DEAD_PERIOD_MS);
        if dead_period_ms.is_none() {
            bail!(
                "feeder.interval_ms x feeder.dead_period_multiplier must be at most {} ms",
                MAX_DEAD_PERIOD_MS
            );
        }
        if self.oracle.currencies.is_empty() {
            bail!("oracle.currencies must list at least one currency");
        }
        if self.oracle.scale_decimals > MAX_SCALE_DECIMALS {
            bail!(
                "oracle.scale_decimals must be at most {}",
                MAX_SCALE_DECIMALS
            );
        }
        if self.operator.address.trim().is_empty() {
            bail!("operator.address is required (FEEDER_OPERATOR__ADDRESS)");
        }
        if self.operator.has_inline_key() {
            bail!("operator.key_uri must not be set; load the key into the gateway keystore");
        }

        let fixed = self.fixed_prices()?;
        let needs_sources = self
            .oracle
            .currencies
            .iter()
            .any(|c| !fixed.contains_key(&normalize_currency(c)));
        let enabled_sources =
            usize::from(self.sources.binance_enabled) + usize::from(self.sources.coinbase_enabled);
        if needs_sources && enabled_sources < self.sources.min_sources.max(1) {
            bail!(
                "sources.min_sources is {} but only {} sources are enabled",
                self.sources.min_sources,
                enabled_sources
            );
        }

        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "env={} oracle={} currencies={:?} interval_ms={} operator={} endpoint={} strategy={}",
            self.app.env,
            self.oracle.name,
            self.oracle.currencies,
            self.feeder.interval_ms,
            self.operator.address,
            self.chain.endpoint,
            self.strategy.enabled
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
