use std::sync::Arc;

use crate::dispatcher::Event;
use crate::heartbeat::Heartbeat;
use crate::oracle::FetchPrices;
use crate::types::PriceBatch;

/// Fetches prices on every tick and publishes them
pub struct PriceFeedTask {
    fetcher: Arc<dyn FetchPrices>,
    on_price: Event<PriceBatch>,
    heartbeat: Arc<Heartbeat>,
}

impl PriceFeedTask {
    pub fn new(
        fetcher: Arc<dyn FetchPrices>,
        on_price: Event<PriceBatch>,
        heartbeat: Arc<Heartbeat>,
    ) -> Self {
        Self {
            fetcher,
            on_price,
            heartbeat,
        }
    }

    pub fn heartbeat(&self) -> &Arc<Heartbeat> {
        &self.heartbeat
    }

    /// One fetch cycle. Returns whether a batch was published.
    ///
    /// A failed fetch is logged and skipped; the next tick retries.
    pub async fn tick(&self) -> bool {
        let batch = match self.fetcher.fetch_prices().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "getPrices error");
                self.heartbeat.set_note("fetch_failed");
                return false;
            }
        };

        let count = batch.len();
        let prices = batch
            .points
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        // Subscribers get the batch before any heartbeat bookkeeping
        let handlers = self.on_price.emit(batch);
        self.heartbeat.mark_alive();

        tracing::info!(count, handlers, prices = %prices, "readData");
        true
    }
}
