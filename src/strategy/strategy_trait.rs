//! Strategy Trait - Common interface of secondary strategies fed by the price event

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PriceBatch;

/// Consumer of every published price batch, alongside the oracle feed.
///
/// Runs as its own handler, so a failing strategy never affects feeding.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecondaryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_prices(&self, batch: PriceBatch) -> Result<()>;
}
