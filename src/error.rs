//! Error types for the feeder core
//!
//! Recoverable errors are caught at the boundary of each task handler and turned
//! into log events plus a heartbeat note; none of them reach the dispatcher.

use thiserror::Error;

/// Errors from the chain collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Membership or storage query failed
    #[error("query {pallet} failed: {reason}")]
    Query { pallet: String, reason: String },
    /// Transaction was refused by the node or gateway
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// Transaction was dropped or became invalid while waiting for inclusion
    #[error("confirmation failed at {stage}: {reason}")]
    Confirmation { stage: &'static str, reason: String },
    /// Confirmation stage did not resolve in time
    #[error("timed out waiting for {stage}")]
    Timeout { stage: &'static str },
    /// Gateway unreachable or returned a malformed reply
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors while converting prices into pallet base units
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("negative price {price} for {currency}")]
    NegativePrice { currency: String, price: String },
    #[error("price {price} for {currency} overflows base unit")]
    Overflow { currency: String, price: String },
}

/// Errors from one feed-submission cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error(transparent)]
    Encoding(#[from] EncodeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl FeedError {
    /// Short stable label for logs and the health report
    pub fn as_label(&self) -> &'static str {
        match self {
            FeedError::Encoding(_) => "encoding_failed",
            FeedError::Chain(ChainError::Query { .. }) => "membership_query_failed",
            FeedError::Chain(ChainError::Rejected(_)) => "submission_rejected",
            FeedError::Chain(ChainError::Confirmation { .. }) => "confirmation_failed",
            FeedError::Chain(ChainError::Timeout { .. }) => "confirmation_timeout",
            FeedError::Chain(ChainError::Transport(_)) => "chain_unreachable",
        }
    }
}

/// Errors while assembling the heartbeat tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LivenessError {
    #[error("member '{name}' already registered in group '{group}'")]
    DuplicateMember { group: String, name: String },
}
