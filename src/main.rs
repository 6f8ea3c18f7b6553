//! Oracle Feeder - Fetch prices, feed the oracle pallet, report liveness

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use oracle_feeder::app::{self, FeederSettings, StrategyBinding};
use oracle_feeder::chain::RpcChainClient;
use oracle_feeder::config::AppConfig;
use oracle_feeder::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_logging(&config.log, config.is_production())?;
    logging::install_panic_hook();

    config.validate().context("Invalid configuration")?;
    info!(config = %config.digest(), "configuration loaded");

    let settings = FeederSettings::from_config(&config)?;
    info!(
        oracle = %settings.names.oracle_pallet,
        membership = %settings.names.membership_pallet,
        operator = %settings.operator,
        "oracle pallets resolved"
    );

    let aggregator = app::price_aggregator(&config)?;
    info!(sources = ?aggregator.source_names(), "price sources ready");

    let chain = RpcChainClient::new(app::rpc_client_config(&config))?;
    info!(endpoint = %chain.endpoint(), "chain gateway client ready");

    let strategy = if config.strategy.enabled {
        Some(StrategyBinding::deviation_watch(
            &settings,
            config.strategy.threshold_pct,
        )?)
    } else {
        None
    };

    let feeder = app::assemble(&settings, Arc::new(aggregator), Arc::new(chain), strategy)?;
    let health = feeder.health();
    let dispatcher = feeder.start();

    #[cfg(feature = "health-api")]
    {
        let port = config.health.port;
        let reporter = health.clone();
        tokio::spawn(async move {
            if let Err(e) = oracle_feeder::health::start_server(reporter, port).await {
                tracing::error!(error = %e, "health API stopped");
            }
        });
    }

    info!(
        interval_ms = config.feeder.interval_ms,
        handlers = ?dispatcher.handler_labels(),
        alive = health.is_alive(),
        "Ready"
    );

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");
    dispatcher.stop();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
