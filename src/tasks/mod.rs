//! Feeder tasks - the two halves of the fetch/feed pipeline
//!
//! [`PriceFeedTask`] runs on the interval trigger and publishes each batch on
//! the price event. [`FeedSubmissionTask`] subscribes to that event and puts
//! the batch on chain. Each owns one heartbeat in the root liveness group.

mod feed_submission;
mod price_feed;

pub use feed_submission::{FeedOutcome, FeedSubmissionTask};
pub use price_feed::PriceFeedTask;

/// Heartbeat of the price fetch
pub const READ_DATA: &str = "readData";
/// Heartbeat of the on-chain submission
pub const FEED_DATA: &str = "feedData";
/// Liveness group of the secondary strategy
pub const TRADE_DEX: &str = "tradeDex";
/// Event carrying every fetched batch
pub const ON_PRICE: &str = "onPrice";
