//! Chain module - Boundary to the blockchain client
//!
//! The feeder never signs or talks to consensus itself. It queries membership
//! and hands a [`Call`] to a [`ChainClient`], then follows the returned
//! [`TxProgress`] through its two stages: `sent` then `in_block`.

mod encoding;
mod rpc;

pub use encoding::{
    encode_values, to_base_unit, FeedValue, DEFAULT_SCALE_DECIMALS, MAX_SCALE_DECIMALS,
};
pub use rpc::{RpcChainClient, RpcClientConfig};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ChainError;
use crate::types::AccountId;

/// Pallet method carrying a batch of oracle values
pub const FEED_VALUES_METHOD: &str = "feedValues";

/// Extrinsic to sign and submit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub pallet: String,
    pub method: String,
    pub args: serde_json::Value,
}

impl Call {
    /// `<pallet>.feedValues(values)` with every value in one call
    pub fn feed_values(pallet: impl Into<String>, values: &[FeedValue]) -> Self {
        Self {
            pallet: pallet.into(),
            method: FEED_VALUES_METHOD.to_string(),
            args: serde_json::json!([values]),
        }
    }
}

/// Block inclusion proof reported by the chain client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inclusion {
    pub tx_hash: String,
    pub block_hash: String,
}

/// Chain capabilities the feeder depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current members of a membership pallet, in storage order
    async fn query_members(&self, pallet: &str) -> Result<Vec<AccountId>, ChainError>;

    /// Sign `call` with the operator key and submit it
    async fn sign_and_submit(&self, call: Call) -> Result<TxProgress, ChainError>;
}

/// Pending submission: resolves `sent`, then `in_block`
#[derive(Debug)]
pub struct TxProgress {
    sent: oneshot::Receiver<Result<String, ChainError>>,
    in_block: oneshot::Receiver<Result<Inclusion, ChainError>>,
}

/// Submission accepted by the network, awaiting inclusion
#[derive(Debug)]
pub struct Broadcast {
    pub tx_hash: String,
    in_block: oneshot::Receiver<Result<Inclusion, ChainError>>,
}

/// Producer side of a [`TxProgress`]
#[derive(Debug)]
pub struct TxReporter {
    sent: Option<oneshot::Sender<Result<String, ChainError>>>,
    in_block: Option<oneshot::Sender<Result<Inclusion, ChainError>>>,
}

impl TxProgress {
    pub fn pending() -> (TxReporter, TxProgress) {
        let (sent_tx, sent_rx) = oneshot::channel();
        let (block_tx, block_rx) = oneshot::channel();
        (
            TxReporter {
                sent: Some(sent_tx),
                in_block: Some(block_tx),
            },
            TxProgress {
                sent: sent_rx,
                in_block: block_rx,
            },
        )
    }

    /// Progress whose stages are already decided
    pub fn resolved(
        sent: Result<String, ChainError>,
        in_block: Result<Inclusion, ChainError>,
    ) -> TxProgress {
        let (mut reporter, progress) = Self::pending();
        reporter.sent(sent);
        reporter.in_block(in_block);
        progress
    }

    /// Wait until the transaction is accepted for broadcast
    pub async fn sent(self) -> Result<Broadcast, ChainError> {
        let tx_hash = self.sent.await.map_err(|_| ChainError::Confirmation {
            stage: "sent",
            reason: "progress channel closed".to_string(),
        })??;
        Ok(Broadcast {
            tx_hash,
            in_block: self.in_block,
        })
    }
}

impl Broadcast {
    /// Wait until the transaction is included in a block
    pub async fn in_block(self) -> Result<Inclusion, ChainError> {
        self.in_block.await.map_err(|_| ChainError::Confirmation {
            stage: "inBlock",
            reason: "progress channel closed".to_string(),
        })?
    }
}

impl TxReporter {
    /// Report the broadcast stage. A failure here also fails inclusion.
    pub fn sent(&mut self, result: Result<String, ChainError>) {
        if let Err(e) = &result {
            self.in_block(Err(e.clone()));
        }
        if let Some(tx) = self.sent.take() {
            let _ = tx.send(result);
        }
    }

    pub fn in_block(&mut self, result: Result<Inclusion, ChainError>) {
        if let Some(tx) = self.in_block.take() {
            let _ = tx.send(result);
        }
    }

    pub fn is_sent_reported(&self) -> bool {
        self.sent.is_none()
    }

    pub fn is_done(&self) -> bool {
        self.sent.is_none() && self.in_block.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyId;

    #[tokio::test]
    async fn progress_resolves_in_order() {
        let (mut reporter, progress) = TxProgress::pending();
        reporter.sent(Ok("0xabc".to_string()));
        reporter.in_block(Ok(Inclusion {
            tx_hash: "0xabc".to_string(),
            block_hash: "0xblock".to_string(),
        }));

        let broadcast = progress.sent().await.expect("sent");
        assert_eq!(broadcast.tx_hash, "0xabc");
        let inclusion = broadcast.in_block().await.expect("in block");
        assert_eq!(inclusion.block_hash, "0xblock");
    }

    #[tokio::test]
    async fn send_failure_also_fails_inclusion() {
        let (mut reporter, progress) = TxProgress::pending();
        reporter.sent(Err(ChainError::Rejected("bad nonce".to_string())));
        assert!(reporter.is_done());

        let err = progress.sent().await.unwrap_err();
        assert_eq!(err, ChainError::Rejected("bad nonce".to_string()));
    }

    #[tokio::test]
    async fn dropped_reporter_is_a_confirmation_failure() {
        let (reporter, progress) = TxProgress::pending();
        drop(reporter);

        let err = progress.sent().await.unwrap_err();
        assert!(matches!(err, ChainError::Confirmation { stage: "sent", .. }));
    }

    #[test]
    fn feed_values_call_carries_all_values_in_one_argument() {
        let values = vec![
            FeedValue::new(CurrencyId::Token("AUSD".to_string()), 1_000_000_000_000),
            FeedValue::new(CurrencyId::Token("DOT".to_string()), 6_500_000_000_000),
        ];
        let call = Call::feed_values("acalaOracle", &values);

        assert_eq!(call.pallet, "acalaOracle");
        assert_eq!(call.method, "feedValues");
        assert_eq!(
            call.args,
            serde_json::json!([[
                [{ "Token": "AUSD" }, "1000000000000"],
                [{ "Token": "DOT" }, "6500000000000"]
            ]])
        );
    }
}
