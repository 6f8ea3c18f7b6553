//! Oracle Feeder Library
//!
//! Periodically fetches prices, feeds them to an on-chain oracle pallet as a
//! registered operator and reports the liveness of both steps.

pub mod app;
pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod logging;
pub mod oracle;
pub mod strategy;
pub mod tasks;
pub mod types;
