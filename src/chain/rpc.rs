//! JSON-RPC client for the chain signing gateway
//!
//! The gateway owns the node connection and the keystore. The feeder only
//! names the signing account by its public address. Methods used:
//! - `oracle_members(pallet)` -> `["<ss58>", ...]`
//! - `oracle_signAndSubmit({ signer, pallet, method, args })` -> `"<tx hash>"`
//! - `oracle_txStatus(txHash)` -> `{ "status": "...", "blockHash": "..." }`
//!
//! Submissions are serialized per client so the signer's nonce is never raced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Call, ChainClient, Inclusion, TxProgress, TxReporter};
use crate::error::ChainError;
use crate::types::AccountId;

/// Connection settings for [`RpcChainClient`]
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub endpoint: String,
    /// Account whose keystore entry the gateway signs with
    pub signer: AccountId,
    pub request_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug)]
enum RpcFailure {
    Transport(String),
    Remote { code: i64, message: String },
}

impl RpcFailure {
    fn into_query_error(self, pallet: &str) -> ChainError {
        match self {
            RpcFailure::Transport(reason) => ChainError::Transport(reason),
            RpcFailure::Remote { code, message } => ChainError::Query {
                pallet: pallet.to_string(),
                reason: format!("{} ({})", message, code),
            },
        }
    }

    fn into_submit_error(self) -> ChainError {
        match self {
            RpcFailure::Transport(reason) => ChainError::Transport(reason),
            RpcFailure::Remote { code, message } => {
                ChainError::Rejected(format!("{} ({})", message, code))
            }
        }
    }
}

/// Transaction status as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub(crate) enum TxStatus {
    Future,
    Ready,
    Broadcast,
    InBlock {
        #[serde(rename = "blockHash")]
        block_hash: String,
    },
    Finalized {
        #[serde(rename = "blockHash")]
        block_hash: String,
    },
    Usurped,
    Dropped,
    Invalid,
}

/// Chain client backed by a JSON-RPC signing gateway
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: Client,
    config: RpcClientConfig,
    submit_lock: Arc<Mutex<()>>,
}

impl RpcChainClient {
    pub fn new(config: RpcClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            submit_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, RpcFailure> {
        call_rpc(&self.client, &self.config.endpoint, method, params).await
    }
}

async fn call_rpc<R: DeserializeOwned>(
    client: &Client,
    endpoint: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<R, RpcFailure> {
    let request = RpcRequest {
        jsonrpc: "2.0",
        id: uuid::Uuid::new_v4().to_string(),
        method,
        params,
    };

    let response = client
        .post(endpoint)
        .json(&request)
        .send()
        .await
        .map_err(|e| RpcFailure::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RpcFailure::Transport(format!(
            "gateway returned {}",
            response.status()
        )));
    }

    let body: RpcResponse<R> = response
        .json()
        .await
        .map_err(|e| RpcFailure::Transport(format!("malformed reply to {}: {}", method, e)))?;
    unpack(method, body)
}

fn unpack<R>(method: &str, body: RpcResponse<R>) -> Result<R, RpcFailure> {
    match (body.result, body.error) {
        (_, Some(err)) => Err(RpcFailure::Remote {
            code: err.code,
            message: err.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(RpcFailure::Transport(format!(
            "empty reply to {}",
            method
        ))),
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn query_members(&self, pallet: &str) -> Result<Vec<AccountId>, ChainError> {
        self.call("oracle_members", serde_json::json!([pallet]))
            .await
            .map_err(|e| e.into_query_error(pallet))
    }

    async fn sign_and_submit(&self, call: Call) -> Result<TxProgress, ChainError> {
        let (reporter, progress) = TxProgress::pending();
        let guard = Arc::clone(&self.submit_lock).lock_owned().await;

        let params = submit_params(&self.config.signer, &call);
        let tx_hash: String = self
            .call("oracle_signAndSubmit", params)
            .await
            .map_err(RpcFailure::into_submit_error)?;

        tracing::debug!(tx_hash = %tx_hash, pallet = %call.pallet, "transaction submitted");

        let client = self.client.clone();
        let endpoint = self.config.endpoint.clone();
        let poll_interval = self.config.poll_interval;
        let timeout = self.config.confirmation_timeout;
        tokio::spawn(async move {
            // Hold the submit lock until the tx leaves the pool
            let _guard = guard;
            let hash = tx_hash.clone();
            let poll = move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let hash = hash.clone();
                async move {
                    let params = serde_json::json!([hash]);
                    call_rpc::<TxStatus>(&client, &endpoint, "oracle_txStatus", params)
                        .await
                        .map_err(RpcFailure::into_submit_error)
                }
            };
            watch_progress(poll, reporter, tx_hash, poll_interval, timeout).await;
        });

        Ok(progress)
    }
}

fn submit_params(signer: &AccountId, call: &Call) -> serde_json::Value {
    serde_json::json!([{
        "signer": signer.as_str(),
        "pallet": call.pallet,
        "method": call.method,
        "args": call.args,
    }])
}

/// Poll transaction status until inclusion, failure or timeout, reporting
/// each stage exactly once
pub(crate) async fn watch_progress<P, Fut>(
    mut poll: P,
    mut reporter: TxReporter,
    tx_hash: String,
    poll_interval: Duration,
    timeout: Duration,
) where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<TxStatus, ChainError>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        match poll().await {
            Ok(TxStatus::Future | TxStatus::Ready) => {}
            Ok(TxStatus::Broadcast) => reporter.sent(Ok(tx_hash.clone())),
            Ok(TxStatus::InBlock { block_hash } | TxStatus::Finalized { block_hash }) => {
                reporter.sent(Ok(tx_hash.clone()));
                reporter.in_block(Ok(Inclusion {
                    tx_hash: tx_hash.clone(),
                    block_hash,
                }));
                return;
            }
            Ok(status @ (TxStatus::Usurped | TxStatus::Dropped | TxStatus::Invalid)) => {
                let stage = if reporter.is_sent_reported() { "inBlock" } else { "sent" };
                let err = ChainError::Confirmation {
                    stage,
                    reason: format!("{:?}", status).to_lowercase(),
                };
                reporter.sent(Err(err.clone()));
                reporter.in_block(Err(err));
                return;
            }
            Err(e) => {
                tracing::debug!(tx_hash = %tx_hash, error = %e, "status poll failed");
            }
        }

        if Instant::now() + poll_interval > deadline {
            let stage = if reporter.is_sent_reported() { "inBlock" } else { "sent" };
            reporter.sent(Err(ChainError::Timeout { stage }));
            reporter.in_block(Err(ChainError::Timeout { stage }));
            return;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
