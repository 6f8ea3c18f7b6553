//! Process assembly
//!
//! Builds the liveness tree, the price event and the dispatcher handlers from
//! already constructed collaborators. The binary supplies the real price
//! sources and chain client; tests supply fakes.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainClient, RpcClientConfig};
use crate::config::{normalize_currency, AppConfig, OracleNames, SourcesConfig};
use crate::dispatcher::{
    self, create_event, on_event, on_interval, Dispatcher, DispatcherBuilder, Event,
    IntervalConfig,
};
use crate::health::HealthReporter;
use crate::heartbeat::{Heartbeat, HeartbeatGroup};
use crate::oracle::sources::{BinanceClient, CoinbaseClient, PriceSource};
use crate::oracle::{FetchPrices, PriceAggregator};
use crate::strategy::{DeviationWatch, SecondaryStrategy};
use crate::tasks::{
    FeedSubmissionTask, PriceFeedTask, FEED_DATA, ON_PRICE, READ_DATA, TRADE_DEX,
};
use crate::types::{AccountId, PriceBatch};

/// Name of the root liveness group
pub const ROOT_GROUP: &str = "oracleFeeder";

/// Everything the pipeline needs from configuration, validated once
#[derive(Debug, Clone)]
pub struct FeederSettings {
    pub interval: Duration,
    pub immediately: bool,
    pub dead_period: Duration,
    pub startup_grace: Duration,
    pub names: OracleNames,
    pub operator: AccountId,
    pub scale_decimals: u32,
}

impl FeederSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            interval: config.interval(),
            immediately: config.feeder.immediately,
            dead_period: config.dead_period(),
            startup_grace: config.startup_grace(),
            names: config.oracle_names()?,
            operator: AccountId::new(config.operator.address.trim()),
            scale_decimals: config.oracle.scale_decimals,
        })
    }

    fn heartbeat(&self) -> Arc<Heartbeat> {
        Arc::new(Heartbeat::new(self.dead_period).with_grace(self.startup_grace))
    }
}

/// A secondary strategy plus the group it reports liveness through
pub struct StrategyBinding {
    pub strategy: Arc<dyn SecondaryStrategy>,
    pub liveness: Arc<HeartbeatGroup>,
}

impl StrategyBinding {
    /// [`DeviationWatch`] with a window of one dead period
    pub fn deviation_watch(settings: &FeederSettings, threshold_pct: f64) -> Result<Self> {
        let liveness = Arc::new(
            HeartbeatGroup::windowed(TRADE_DEX, settings.dead_period)
                .with_grace(settings.startup_grace),
        );
        let strategy = DeviationWatch::from_threshold(threshold_pct, Arc::clone(&liveness))?;
        Ok(Self {
            strategy: Arc::new(strategy),
            liveness,
        })
    }
}

/// Assembled but not yet running feeder
pub struct Feeder {
    pub root: Arc<HeartbeatGroup>,
    pub on_price: Event<PriceBatch>,
    pub price_feed: Arc<PriceFeedTask>,
    pub feed_submission: Arc<FeedSubmissionTask>,
    builder: DispatcherBuilder,
}

impl Feeder {
    pub fn health(&self) -> HealthReporter {
        HealthReporter::new(Arc::clone(&self.root))
    }

    pub fn handler_count(&self) -> usize {
        self.builder.len()
    }

    /// Start the timers and seal the price event
    pub fn start(self) -> Dispatcher {
        self.builder.build()
    }
}

/// Wire the tasks, heartbeats and handlers together
pub fn assemble(
    settings: &FeederSettings,
    fetcher: Arc<dyn FetchPrices>,
    chain: Arc<dyn ChainClient>,
    strategy: Option<StrategyBinding>,
) -> Result<Feeder> {
    let root = Arc::new(HeartbeatGroup::new(ROOT_GROUP));
    let on_price = create_event::<PriceBatch>(ON_PRICE);

    let read_heartbeat = settings.heartbeat();
    let feed_heartbeat = settings.heartbeat();
    root.add_heartbeat(READ_DATA, Arc::clone(&read_heartbeat))?;
    root.add_heartbeat(FEED_DATA, Arc::clone(&feed_heartbeat))?;

    let price_feed = Arc::new(PriceFeedTask::new(fetcher, on_price.clone(), read_heartbeat));
    let feed_submission = Arc::new(FeedSubmissionTask::new(
        chain,
        settings.names.clone(),
        settings.operator.clone(),
        settings.scale_decimals,
        feed_heartbeat,
    ));

    let ticking = Arc::clone(&price_feed);
    let feeding = Arc::clone(&feed_submission);
    let mut builder = dispatcher::builder()
        .add_handler(
            on_interval(
                IntervalConfig::new(settings.interval, settings.immediately),
                move || {
                    let task = Arc::clone(&ticking);
                    async move {
                        task.tick().await;
                        anyhow::Ok(())
                    }
                },
            )
            .named(READ_DATA),
        )
        .add_handler(
            on_event(&on_price, move |batch: PriceBatch| {
                let task = Arc::clone(&feeding);
                async move { task.run(batch).await }
            })
            .named(FEED_DATA),
        );

    if let Some(binding) = strategy {
        root.add_group(TRADE_DEX, binding.liveness)?;
        let strategy = binding.strategy;
        tracing::info!(strategy = strategy.name(), "secondary strategy enabled");
        builder = builder.add_handler(
            on_event(&on_price, move |batch: PriceBatch| {
                let strategy = Arc::clone(&strategy);
                async move { strategy.on_prices(batch).await }
            })
            .named(TRADE_DEX),
        );
    }

    Ok(Feeder {
        root,
        on_price,
        price_feed,
        feed_submission,
        builder,
    })
}

/// Enabled REST price sources
pub fn price_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn PriceSource>>> {
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    if config.binance_enabled {
        sources.push(Arc::new(BinanceClient::new(timeout)?));
    }
    if config.coinbase_enabled {
        sources.push(Arc::new(CoinbaseClient::new(timeout)?));
    }
    Ok(sources)
}

/// Median aggregator over the enabled sources and pinned prices
pub fn price_aggregator(config: &AppConfig) -> Result<PriceAggregator> {
    let currencies = config
        .oracle
        .currencies
        .iter()
        .map(|c| normalize_currency(c))
        .collect();
    let fixed_prices = config.fixed_prices()?;
    let sources = price_sources(&config.sources).context("Failed to create price sources")?;
    Ok(PriceAggregator::new(
        sources,
        currencies,
        fixed_prices,
        config.sources.min_sources,
    ))
}

/// Gateway client settings; the operator account is the signer
pub fn rpc_client_config(config: &AppConfig) -> RpcClientConfig {
    RpcClientConfig {
        endpoint: config.chain.endpoint.clone(),
        signer: AccountId::new(config.operator.address.trim()),
        request_timeout: Duration::from_millis(config.chain.request_timeout_ms),
        confirmation_timeout: Duration::from_millis(config.chain.confirmation_timeout_ms),
        poll_interval: Duration::from_millis(config.chain.poll_interval_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Inclusion, MockChainClient, TxProgress};
    use crate::oracle::MockFetchPrices;
    use crate::strategy::MockSecondaryStrategy;
    use crate::types::PricePoint;
    use rust_decimal_macros::dec;

    const OPERATOR: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn settings() -> FeederSettings {
        FeederSettings {
            interval: Duration::from_secs(1),
            immediately: true,
            dead_period: Duration::from_secs(4),
            startup_grace: Duration::ZERO,
            names: OracleNames::derive("acala").unwrap(),
            operator: AccountId::new(OPERATOR),
            scale_decimals: 12,
        }
    }

    #[tokio::test]
    async fn assembles_root_group_in_registration_order() {
        let settings = settings();
        let strategy = StrategyBinding::deviation_watch(&settings, 1.0).unwrap();
        let feeder = assemble(
            &settings,
            Arc::new(MockFetchPrices::new()),
            Arc::new(MockChainClient::new()),
            Some(strategy),
        )
        .unwrap();

        assert_eq!(feeder.handler_count(), 3);
        let snapshot = feeder.health().snapshot();
        assert_eq!(
            snapshot.members.names().collect::<Vec<_>>(),
            vec![READ_DATA, FEED_DATA, TRADE_DEX]
        );
    }

    #[tokio::test]
    async fn strategy_is_optional() {
        let feeder = assemble(
            &settings(),
            Arc::new(MockFetchPrices::new()),
            Arc::new(MockChainClient::new()),
            None,
        )
        .unwrap();

        assert_eq!(feeder.handler_count(), 2);
        assert_eq!(feeder.root.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_strategy_does_not_block_feeding() {
        let mut fetcher = MockFetchPrices::new();
        fetcher.expect_fetch_prices().returning(|| {
            Ok(PriceBatch::new(vec![PricePoint::new("DOT", dec!(6.5))]))
        });

        let mut chain = MockChainClient::new();
        chain
            .expect_query_members()
            .returning(|_| Ok(vec![AccountId::new(OPERATOR)]));
        chain.expect_sign_and_submit().times(1).returning(|_| {
            Ok(TxProgress::resolved(
                Ok("0x01".to_string()),
                Ok(Inclusion {
                    tx_hash: "0x01".to_string(),
                    block_hash: "0xblock".to_string(),
                }),
            ))
        });

        let mut strategy = MockSecondaryStrategy::new();
        strategy.expect_name().return_const("broken");
        strategy
            .expect_on_prices()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("strategy crashed")));
        let binding = StrategyBinding {
            strategy: Arc::new(strategy),
            liveness: Arc::new(HeartbeatGroup::windowed(TRADE_DEX, Duration::from_secs(4))),
        };

        let feeder =
            assemble(&settings(), Arc::new(fetcher), Arc::new(chain), Some(binding)).unwrap();
        let feed = Arc::clone(feeder.feed_submission.heartbeat());
        let dispatcher = feeder.start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(feed.last_alive().is_some());
        dispatcher.stop();
    }

    #[tokio::test]
    async fn aggregator_normalizes_currencies_onto_pins() {
        let mut config = crate::config::tests_support::sample();
        config.oracle.currencies = vec![" ausd ".to_string()];
        config.sources.binance_enabled = false;
        config.sources.coinbase_enabled = false;

        let aggregator = price_aggregator(&config).unwrap();
        assert!(aggregator.source_names().is_empty());

        let batch = aggregator.fetch_prices().await.unwrap();
        assert_eq!(
            batch.get("AUSD").map(|p| p.price),
            Some(dec!(1.00))
        );
    }

    #[test]
    fn rpc_config_signs_as_operator_account() {
        let mut config = crate::config::tests_support::sample();
        config.operator.key_uri = Some("bottom drive obey lake//Alice".to_string());
        let rpc = rpc_client_config(&config);
        assert_eq!(rpc.signer, AccountId::new(OPERATOR));
        assert_eq!(rpc.poll_interval, Duration::from_millis(500));
        assert!(!format!("{:?}", rpc).contains("bottom drive"));
    }
}
