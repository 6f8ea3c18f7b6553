use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chain::{encode_values, Call, ChainClient, Inclusion};
use crate::config::OracleNames;
use crate::error::FeedError;
use crate::heartbeat::Heartbeat;
use crate::types::{AccountId, PriceBatch};

/// Result of one feed cycle that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Included in a block
    Fed(Inclusion),
    /// Operator is not in the membership list this cycle
    NotAuthorized,
    /// A newer batch arrived while this one waited for the previous submission
    Superseded,
    /// Nothing to submit
    EmptyBatch,
}

impl FeedOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            FeedOutcome::Fed(_) => "fed",
            FeedOutcome::NotAuthorized => "not_authorized",
            FeedOutcome::Superseded => "superseded",
            FeedOutcome::EmptyBatch => "empty_batch",
        }
    }
}

/// Submits every published batch to the oracle pallet as the operator.
///
/// Submissions are serialized: at most one is in flight, and when several
/// batches queue up behind it only the newest is submitted.
pub struct FeedSubmissionTask {
    chain: Arc<dyn ChainClient>,
    names: OracleNames,
    operator: AccountId,
    scale_decimals: u32,
    heartbeat: Arc<Heartbeat>,
    submit_lock: Mutex<()>,
    latest_ticket: AtomicU64,
}

impl FeedSubmissionTask {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        names: OracleNames,
        operator: AccountId,
        scale_decimals: u32,
        heartbeat: Arc<Heartbeat>,
    ) -> Self {
        Self {
            chain,
            names,
            operator,
            scale_decimals,
            heartbeat,
            submit_lock: Mutex::new(()),
            latest_ticket: AtomicU64::new(0),
        }
    }

    pub fn heartbeat(&self) -> &Arc<Heartbeat> {
        &self.heartbeat
    }

    pub fn names(&self) -> &OracleNames {
        &self.names
    }

    /// Run one feed cycle for `batch`.
    ///
    /// The heartbeat is marked alive only once the transaction is both sent
    /// and included in a block.
    pub async fn handle(&self, batch: PriceBatch) -> Result<FeedOutcome, FeedError> {
        // Empty batches never take a ticket, so they cannot supersede real ones
        if batch.is_empty() {
            tracing::debug!("empty batch, nothing to feed");
            return Ok(FeedOutcome::EmptyBatch);
        }

        let ticket = self.latest_ticket.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = self.submit_lock.lock().await;

        if self.latest_ticket.load(Ordering::Acquire) != ticket {
            tracing::debug!(ticket, batch_ts = batch.ts, "batch superseded by a newer one");
            return Ok(FeedOutcome::Superseded);
        }

        // Membership can change between cycles, so the index is never cached
        let members = self.chain.query_members(&self.names.membership_pallet).await?;
        let Some(index) = members.iter().position(|member| *member == self.operator) else {
            tracing::info!(
                account = %self.operator,
                pallet = %self.names.membership_pallet,
                members = members.len(),
                "Not valid oracle operator"
            );
            return Ok(FeedOutcome::NotAuthorized);
        };

        let values = encode_values(&batch, self.scale_decimals)?;
        tracing::debug!(
            account = %self.operator,
            index,
            values = values.len(),
            "{}.feedValues",
            self.names.oracle_pallet
        );

        let call = Call::feed_values(self.names.oracle_pallet.as_str(), &values);
        let progress = self.chain.sign_and_submit(call).await?;

        let broadcast = progress.sent().await?;
        tracing::debug!(tx_hash = %broadcast.tx_hash, "feedValues sent");

        let inclusion = broadcast.in_block().await?;
        self.heartbeat.mark_alive();

        tracing::info!(
            tx_hash = %inclusion.tx_hash,
            block_hash = %inclusion.block_hash,
            "feedData done"
        );
        Ok(FeedOutcome::Fed(inclusion))
    }

    /// Handler boundary: failures are logged and noted on the heartbeat,
    /// never returned to the dispatcher.
    pub async fn run(&self, batch: PriceBatch) -> anyhow::Result<()> {
        match self.handle(batch).await {
            Ok(FeedOutcome::NotAuthorized) => {
                self.heartbeat.set_note(FeedOutcome::NotAuthorized.as_label());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, reason = e.as_label(), "feedData failed");
                self.heartbeat.set_note(e.as_label());
            }
        }
        Ok(())
    }
}
